//! Cluster snapshot reading
//!
//! Invokes the cluster data source (`stolonctl clusterdata read`) and
//! normalizes its JSON output into a [`ClusterSnapshot`].

use crate::error::{DataSourceError, IterationError};
use common::ShellRunner;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Database role as reported by the cluster coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Standby,
}

impl Role {
    /// Anything other than "standby" is treated as the primary role
    /// (stolon reports "master").
    pub fn from_spec(role: &str) -> Self {
        if role == "standby" {
            Role::Standby
        } else {
            Role::Primary
        }
    }
}

/// One database process as seen by the coordinator.
///
/// Every field is optional because the coordinator omits what it does not
/// know yet. `healthy: None` means unknown, which is not the same as `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub role: Option<Role>,
    pub healthy: Option<bool>,
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Normalized view of one data source read, keyed by instance identifier.
///
/// `BTreeMap` keeps iteration sorted by identifier regardless of the order
/// the coordinator emitted the records in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub instances: BTreeMap<String, InstanceRecord>,
}

// Raw stolon clusterdata layout. Only the fields we route on are modelled.

#[derive(Deserialize)]
struct RawClusterData {
    /// Newer stolon releases
    #[serde(rename = "DBs", default)]
    dbs_upper: Option<BTreeMap<String, RawDb>>,
    /// Older stolon releases
    #[serde(rename = "dbs", default)]
    dbs_lower: Option<BTreeMap<String, RawDb>>,
}

#[derive(Deserialize)]
struct RawDb {
    #[serde(default)]
    spec: Option<RawSpec>,
    #[serde(default)]
    status: Option<RawStatus>,
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    #[serde(default)]
    healthy: Option<bool>,
    #[serde(default)]
    listen_address: Option<String>,
    #[serde(default)]
    port: Option<RawPort>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u64),
    Text(String),
    Other(serde_json::Value),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// An address is pasted verbatim into a balancer `server` line, so anything
/// that could split or comment out that line makes it unusable.
fn parse_address(value: Option<String>) -> Option<String> {
    let address = non_empty(value)?;
    if address
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '#')
    {
        debug!(address = ?address, "Ignoring malformed listen address");
        return None;
    }
    Some(address)
}

/// Ports must fit a TCP port; 0 is not routable.
fn parse_port(value: Option<RawPort>) -> Option<u16> {
    let raw = value?;
    let port = match &raw {
        RawPort::Text(s) if s.trim().is_empty() => return None,
        RawPort::Text(s) => s.trim().parse::<u16>().ok(),
        RawPort::Number(n) => u16::try_from(*n).ok(),
        RawPort::Other(_) => None,
    }
    .filter(|port| *port != 0);

    if port.is_none() {
        debug!(port = ?raw, "Ignoring malformed port");
    }
    port
}

impl From<RawDb> for InstanceRecord {
    fn from(db: RawDb) -> Self {
        let role = db
            .spec
            .and_then(|spec| spec.role)
            .map(|role| Role::from_spec(&role));

        match db.status {
            Some(status) => InstanceRecord {
                role,
                healthy: status.healthy,
                address: parse_address(status.listen_address),
                port: parse_port(status.port),
            },
            None => InstanceRecord {
                role,
                healthy: None,
                address: None,
                port: None,
            },
        }
    }
}

impl ClusterSnapshot {
    /// Parse the data source's JSON document.
    ///
    /// The instance map may live under `DBs` or `dbs`; when both are present
    /// `DBs` wins.
    pub fn from_json(json: &str) -> Result<Self, IterationError> {
        let raw: RawClusterData = serde_json::from_str(json)?;

        let dbs = raw.dbs_upper.or(raw.dbs_lower).ok_or_else(|| {
            IterationError::Parse("document has neither a `DBs` nor a `dbs` map".to_string())
        })?;

        let instances = dbs
            .into_iter()
            .map(|(id, db)| (id, InstanceRecord::from(db)))
            .collect();

        Ok(Self { instances })
    }
}

/// Reads cluster topology from the external data source.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    command: String,
    timeout: Duration,
}

impl SnapshotReader {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Run the data source once and parse its output. No retries.
    pub async fn read<R: ShellRunner>(
        &self,
        runner: &R,
    ) -> Result<ClusterSnapshot, IterationError> {
        let output = runner
            .run_shell(&self.command, self.timeout)
            .await
            .map_err(DataSourceError::from)?;

        if !output.success {
            return Err(DataSourceError::Failed {
                command: self.command.clone(),
                exit: output.exit_description(),
                stderr: output.stderr,
            }
            .into());
        }

        let snapshot = ClusterSnapshot::from_json(&output.stdout)?;
        debug!(instances = snapshot.instances.len(), "Read cluster snapshot");
        Ok(snapshot)
    }
}
