//! Topology classification
//!
//! Partitions a snapshot's instances into the primary, the routable standbys,
//! and everything that is not eligible for routing.

use crate::snapshot::{ClusterSnapshot, InstanceRecord, Role};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// A routable network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// HAProxy server name derived from the endpoint, stable across polls.
    pub fn server_name(&self) -> String {
        format!("{}_{}", self.address, self.port)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Result of classifying one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub primary: Option<Endpoint>,
    /// Healthy standbys in instance identifier order, deduplicated by endpoint.
    pub standbys: Vec<Endpoint>,
}

/// Why an instance was left out of routing.
fn ineligibility(record: &InstanceRecord) -> Option<&'static str> {
    match record {
        InstanceRecord { healthy: None, .. } => Some("health unknown"),
        InstanceRecord { address: None, .. } => Some("no usable listen address"),
        InstanceRecord { port: None, .. } => Some("no usable port"),
        InstanceRecord { role: None, .. } => Some("no role"),
        InstanceRecord {
            healthy: Some(false),
            ..
        } => Some("unhealthy"),
        _ => None,
    }
}

/// Classify every instance of the snapshot.
///
/// Instances are visited in identifier order, so when the coordinator reports
/// more than one healthy primary the one with the greatest identifier wins.
pub fn classify(snapshot: &ClusterSnapshot) -> Classification {
    let mut classification = Classification::default();
    let mut seen = HashSet::new();
    let mut primaries = 0usize;

    for (id, record) in &snapshot.instances {
        if let Some(reason) = ineligibility(record) {
            debug!(instance = %id, reason, "Instance not eligible for routing");
            continue;
        }

        // Presence of all of these was checked above
        let (Some(role), Some(address), Some(port)) = (record.role, &record.address, record.port)
        else {
            continue;
        };
        let endpoint = Endpoint::new(address.as_str(), port);

        match role {
            Role::Standby => {
                if seen.insert(endpoint.clone()) {
                    classification.standbys.push(endpoint);
                } else {
                    debug!(instance = %id, endpoint = %endpoint, "Duplicate standby endpoint");
                }
            }
            Role::Primary => {
                primaries += 1;
                classification.primary = Some(endpoint);
            }
        }
    }

    if primaries > 1 {
        warn!(
            primaries,
            chosen = ?classification.primary.as_ref().map(ToString::to_string),
            "Coordinator reports more than one healthy primary"
        );
    }

    classification
}
