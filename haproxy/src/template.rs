//! HAProxy configuration template rendering
//!
//! Renders a [`BackendSet`] plus static tunables through a Jinja template.
//! The built-in template ships with the binary; operators can point
//! `haproxy_template` at their own file, which is re-read every iteration.
//! The same inputs always produce byte-identical output, which is what the
//! reconciler compares against the file on disk.
//!
//! Variables available to templates:
//! - `servers`: standby endpoints as "address:port" strings
//! - `backends`: standby endpoints as objects (`name`, `address`, `port`, `endpoint`)
//! - `primary`: the primary endpoint object, or none
//! - `used_fallback`, `frontend_port`, `master_port`
//! - `inter_timeout_ms`, `fall_count`, `rise_count`
//! - `max_conn`, `timeout_connect`, `timeout_client`, `timeout_server`

use crate::backends::BackendSet;
use crate::error::IterationError;
use crate::topology::Endpoint;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

/// Template compiled into the binary.
pub const BUILTIN_TEMPLATE: &str = include_str!("../templates/stolon_haproxy.j2");

/// Static rendering inputs taken from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    pub standby_port: u16,
    pub master_port: Option<u16>,
    pub inter_timeout_ms: u64,
    pub rise_count: u32,
    pub fall_count: u32,
    pub max_conn: u32,
    pub timeout_connect: String,
    pub timeout_client: String,
    pub timeout_server: String,
}

/// Where the template text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin,
    File(PathBuf),
}

#[derive(Serialize)]
struct ServerEntry<'a> {
    name: String,
    address: &'a str,
    port: u16,
    endpoint: String,
}

impl<'a> From<&'a Endpoint> for ServerEntry<'a> {
    fn from(endpoint: &'a Endpoint) -> Self {
        Self {
            name: endpoint.server_name(),
            address: &endpoint.address,
            port: endpoint.port,
            endpoint: endpoint.to_string(),
        }
    }
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    servers: Vec<String>,
    backends: Vec<ServerEntry<'a>>,
    primary: Option<ServerEntry<'a>>,
    used_fallback: bool,
    frontend_port: u16,
    master_port: Option<u16>,
    inter_timeout_ms: u64,
    fall_count: u32,
    rise_count: u32,
    max_conn: u32,
    timeout_connect: &'a str,
    timeout_client: &'a str,
    timeout_server: &'a str,
}

impl<'a> TemplateContext<'a> {
    fn new(backends: &'a BackendSet, tunables: &'a Tunables) -> Self {
        Self {
            servers: backends.standby_list(),
            backends: backends.standbys.iter().map(ServerEntry::from).collect(),
            primary: backends.primary.as_ref().map(ServerEntry::from),
            used_fallback: backends.used_fallback,
            frontend_port: tunables.standby_port,
            master_port: tunables.master_port,
            inter_timeout_ms: tunables.inter_timeout_ms,
            fall_count: tunables.fall_count,
            rise_count: tunables.rise_count,
            max_conn: tunables.max_conn,
            timeout_connect: &tunables.timeout_connect,
            timeout_client: &tunables.timeout_client,
            timeout_server: &tunables.timeout_server,
        }
    }
}

/// Render `template` for one backend set.
///
/// Refuses an empty standby list: a balancer with no backends is worse than
/// one still running on stale config. Undefined template variables are errors.
pub fn render(
    template: &str,
    backends: &BackendSet,
    tunables: &Tunables,
) -> Result<String, IterationError> {
    if backends.is_empty() {
        return Err(IterationError::Render(
            "refusing to render an empty standby backend list".to_string(),
        ));
    }

    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    Ok(env.render_str(template, TemplateContext::new(backends, tunables))?)
}

/// Template source plus tunables, as held by the poll loop.
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    source: TemplateSource,
    tunables: Tunables,
}

impl ConfigRenderer {
    pub fn new(source: TemplateSource, tunables: Tunables) -> Self {
        Self { source, tunables }
    }

    fn template_text(&self) -> Result<Cow<'static, str>, IterationError> {
        match &self.source {
            TemplateSource::Builtin => Ok(Cow::Borrowed(BUILTIN_TEMPLATE)),
            TemplateSource::File(path) => fs::read_to_string(path).map(Cow::Owned).map_err(|e| {
                IterationError::Render(format!(
                    "failed to read template {}: {}",
                    path.display(),
                    e
                ))
            }),
        }
    }

    pub fn render(&self, backends: &BackendSet) -> Result<String, IterationError> {
        render(&self.template_text()?, backends, &self.tunables)
    }
}
