//! Reconciler configuration
//!
//! Settings come from a YAML file named on the command line; the stolonctl
//! connection details come from the environment and are inherited by the
//! data source command.

use crate::error::StartupError;
use crate::template::{TemplateSource, Tunables};
use common::ConfigExt;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CLUSTER_NAME_VAR: &str = "STOLONCTL_CLUSTER_NAME";
pub const STORE_BACKEND_VAR: &str = "STOLONCTL_STORE_BACKEND";
pub const STORE_ENDPOINTS_VAR: &str = "STOLONCTL_STORE_ENDPOINTS";

fn default_inter_timeout_ms() -> u64 {
    2000
}

fn default_rise_count() -> u32 {
    2
}

fn default_fall_count() -> u32 {
    3
}

fn default_max_conn() -> u32 {
    1000
}

fn default_timeout_connect() -> String {
    "10s".to_string()
}

fn default_timeout_client() -> String {
    "30m".to_string()
}

fn default_timeout_server() -> String {
    "30m".to_string()
}

fn default_stolonctl_command() -> String {
    "stolonctl clusterdata read".to_string()
}

fn default_poll_timeout() -> f64 {
    10.0
}

fn default_command_timeout() -> f64 {
    30.0
}

fn positive_seconds(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Contents of the YAML config file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HAProxy config file this process owns
    pub postgres_haproxy_config: PathBuf,
    /// Read-only frontend port (historical key)
    #[serde(default)]
    pub postgres_haproxy_port: Option<u16>,
    /// Read-only frontend port; wins over `postgres_haproxy_port`
    #[serde(default)]
    pub postgres_standby_haproxy_port: Option<u16>,
    /// Read-write frontend port; the primary section is only rendered when set
    #[serde(default)]
    pub postgres_master_haproxy_port: Option<u16>,
    #[serde(default)]
    pub fallback_to_master: bool,
    #[serde(default = "default_inter_timeout_ms")]
    pub inter_timeout_ms: u64,
    #[serde(default = "default_rise_count")]
    pub rise_count: u32,
    #[serde(default = "default_fall_count")]
    pub fall_count: u32,
    #[serde(default = "default_max_conn")]
    pub max_conn: u32,
    #[serde(default = "default_timeout_connect")]
    pub timeout_connect: String,
    #[serde(default = "default_timeout_client")]
    pub timeout_client: String,
    #[serde(default = "default_timeout_server")]
    pub timeout_server: String,
    /// Jinja template for the HAProxy config; the built-in one when unset
    #[serde(default)]
    pub haproxy_template: Option<PathBuf>,
    pub haproxy_reload_command: String,
    #[serde(default = "default_stolonctl_command")]
    pub stolonctl_command: String,
    /// Seconds to sleep between poll iterations
    #[serde(default = "default_poll_timeout")]
    pub timeout: f64,
    /// Upper bound in seconds on any external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout: f64,
}

impl Settings {
    /// Load and validate the config file
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let load_error = |reason: String| StartupError::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|e| load_error(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), StartupError> {
        let invalid = |msg: &str| -> Result<(), StartupError> {
            Err(StartupError::InvalidConfig(msg.to_string()))
        };

        if self.postgres_haproxy_config.as_os_str().is_empty() {
            return invalid("postgres_haproxy_config must not be empty");
        }
        if matches!(&self.haproxy_template, Some(path) if path.as_os_str().is_empty()) {
            return invalid("haproxy_template must not be empty when set");
        }
        if self.haproxy_reload_command.trim().is_empty() {
            return invalid("haproxy_reload_command must not be empty");
        }
        if self.stolonctl_command.trim().is_empty() {
            return invalid("stolonctl_command must not be empty");
        }
        if !positive_seconds(self.timeout) {
            return invalid("timeout must be a positive number of seconds");
        }
        if !positive_seconds(self.command_timeout) {
            return invalid("command_timeout must be a positive number of seconds");
        }
        if self.postgres_master_haproxy_port == Some(0) {
            return invalid("postgres_master_haproxy_port must not be 0");
        }
        self.tunables().map(|_| ())
    }

    /// Read-only frontend port, whichever key supplied it
    pub fn standby_port(&self) -> Option<u16> {
        self.postgres_standby_haproxy_port
            .or(self.postgres_haproxy_port)
            .filter(|port| *port != 0)
    }

    /// Rendering inputs derived from the file
    pub fn tunables(&self) -> Result<Tunables, StartupError> {
        let standby_port = self.standby_port().ok_or_else(|| {
            StartupError::InvalidConfig(
                "one of postgres_haproxy_port or postgres_standby_haproxy_port must be set"
                    .to_string(),
            )
        })?;

        Ok(Tunables {
            standby_port,
            master_port: self.postgres_master_haproxy_port,
            inter_timeout_ms: self.inter_timeout_ms,
            rise_count: self.rise_count,
            fall_count: self.fall_count,
            max_conn: self.max_conn,
            timeout_connect: self.timeout_connect.clone(),
            timeout_client: self.timeout_client.clone(),
            timeout_server: self.timeout_server.clone(),
        })
    }

    pub fn template_source(&self) -> TemplateSource {
        match &self.haproxy_template {
            Some(path) => TemplateSource::File(path.clone()),
            None => TemplateSource::Builtin,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.command_timeout)
    }
}

/// stolonctl connection details, required at startup
#[derive(Debug, Clone)]
pub struct StolonEnv {
    pub cluster_name: String,
    pub store_backend: String,
    pub store_endpoints: String,
}

impl StolonEnv {
    /// Read the environment, naming the first missing variable on failure
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|name| String::env_required(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StartupError> {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(StartupError::MissingEnvironment(name))
        };

        Ok(Self {
            cluster_name: get(CLUSTER_NAME_VAR)?,
            store_backend: get(STORE_BACKEND_VAR)?,
            store_endpoints: get(STORE_ENDPOINTS_VAR)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(yaml: &str) -> Result<Settings, StartupError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, yaml).unwrap();
        Settings::load(&path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = load(
            r#"
postgres_haproxy_config: /etc/haproxy/haproxy.cfg
postgres_haproxy_port: 5433
haproxy_reload_command: systemctl reload haproxy
"#,
        )
        .unwrap();

        assert!(!settings.fallback_to_master);
        assert_eq!(settings.stolonctl_command, "stolonctl clusterdata read");
        assert_eq!(settings.poll_interval(), Duration::from_secs(10));
        assert_eq!(settings.command_timeout(), Duration::from_secs(30));

        let tunables = settings.tunables().unwrap();
        assert_eq!(tunables.standby_port, 5433);
        assert_eq!(tunables.master_port, None);
        assert_eq!(tunables.fall_count, 3);
        assert_eq!(settings.template_source(), TemplateSource::Builtin);
    }

    #[test]
    fn test_template_path() {
        let settings = load(
            r#"
postgres_haproxy_config: /etc/haproxy/haproxy.cfg
postgres_haproxy_port: 5433
haproxy_template: /etc/stolon-haproxy/stolon_haproxy.j2
haproxy_reload_command: systemctl reload haproxy
"#,
        )
        .unwrap();

        assert_eq!(
            settings.template_source(),
            TemplateSource::File(PathBuf::from("/etc/stolon-haproxy/stolon_haproxy.j2"))
        );
    }

    #[test]
    fn test_split_ports() {
        let settings = load(
            r#"
postgres_haproxy_config: /etc/haproxy/haproxy.cfg
postgres_haproxy_port: 6000
postgres_standby_haproxy_port: 5433
postgres_master_haproxy_port: 5432
fallback_to_master: true
inter_timeout_ms: 500
rise_count: 1
timeout: 2.5
haproxy_reload_command: systemctl reload haproxy
"#,
        )
        .unwrap();

        let tunables = settings.tunables().unwrap();
        assert_eq!(tunables.standby_port, 5433);
        assert_eq!(tunables.master_port, Some(5432));
        assert_eq!(tunables.inter_timeout_ms, 500);
        assert!(settings.fallback_to_master);
        assert_eq!(settings.poll_interval(), Duration::from_millis(2500));
    }

    #[test]
    fn test_missing_standby_port_is_invalid() {
        let err = load(
            r#"
postgres_haproxy_config: /etc/haproxy/haproxy.cfg
haproxy_reload_command: systemctl reload haproxy
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StartupError::InvalidConfig(_)));
    }

    #[test]
    fn test_non_positive_interval_is_invalid() {
        let err = load(
            r#"
postgres_haproxy_config: /etc/haproxy/haproxy.cfg
postgres_haproxy_port: 5433
haproxy_reload_command: systemctl reload haproxy
timeout: 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StartupError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_required_key_is_load_error() {
        let err = load("postgres_haproxy_port: 5433\n").unwrap_err();
        assert!(matches!(err, StartupError::ConfigLoad { .. }));
    }

    #[test]
    fn test_unreadable_file_is_load_error() {
        let err = Settings::load(Path::new("/nonexistent/stolon-haproxy.yml")).unwrap_err();
        assert!(matches!(err, StartupError::ConfigLoad { .. }));
    }

    #[test]
    fn test_env_names_first_missing_variable() {
        let vars: HashMap<&str, &str> = [
            (CLUSTER_NAME_VAR, "pg"),
            (STORE_ENDPOINTS_VAR, "http://etcd:2379"),
        ]
        .into_iter()
        .collect();

        let err =
            StolonEnv::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap_err();
        assert!(matches!(err, StartupError::MissingEnvironment(STORE_BACKEND_VAR)));
        assert_eq!(
            err.to_string(),
            "Please set STOLONCTL_STORE_BACKEND environment variable"
        );
    }

    #[test]
    fn test_env_complete() {
        let env = StolonEnv::from_lookup(|name| Some(format!("{}-value", name))).unwrap();
        assert_eq!(env.cluster_name, "STOLONCTL_CLUSTER_NAME-value");
        assert_eq!(env.store_endpoints, "STOLONCTL_STORE_ENDPOINTS-value");
    }
}
