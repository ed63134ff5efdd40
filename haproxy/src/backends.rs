//! Backend set resolution
//!
//! Applies the fallback-to-primary policy to a classification.

use crate::topology::{Classification, Endpoint};

/// The endpoints to expose through the balancer for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSet {
    pub primary: Option<Endpoint>,
    pub standbys: Vec<Endpoint>,
    /// True when no standby was available and the primary was substituted.
    pub used_fallback: bool,
}

impl BackendSet {
    /// No endpoint to route read traffic to. Such a set must never be rendered.
    pub fn is_empty(&self) -> bool {
        self.standbys.is_empty()
    }

    /// Standby endpoints as "address:port" strings, for logging.
    pub fn standby_list(&self) -> Vec<String> {
        self.standbys.iter().map(ToString::to_string).collect()
    }

    /// Standby endpoints that entered or left relative to `previous`.
    pub fn changes_since(&self, previous: &BackendSet) -> BackendChanges {
        let missing_from = |from: &[Endpoint], other: &[Endpoint]| {
            from.iter()
                .filter(|endpoint| !other.contains(endpoint))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        };

        BackendChanges {
            added: missing_from(&self.standbys, &previous.standbys),
            removed: missing_from(&previous.standbys, &self.standbys),
        }
    }
}

/// Difference between two standby lists, as "address:port" strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Resolve the backend set.
///
/// Fallback only happens when a healthy primary was actually observed;
/// otherwise the result is empty.
pub fn resolve(classified: Classification, fallback_to_master: bool) -> BackendSet {
    let Classification { primary, standbys } = classified;

    if !standbys.is_empty() {
        return BackendSet {
            primary,
            standbys,
            used_fallback: false,
        };
    }

    match primary {
        Some(primary) if fallback_to_master => BackendSet {
            standbys: vec![primary.clone()],
            primary: Some(primary),
            used_fallback: true,
        },
        primary => BackendSet {
            primary,
            standbys: Vec::new(),
            used_fallback: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary() -> Endpoint {
        Endpoint::new("10.0.0.1", 5432)
    }

    fn standbys() -> Vec<Endpoint> {
        vec![
            Endpoint::new("10.0.0.2", 5432),
            Endpoint::new("10.0.0.3", 5432),
        ]
    }

    #[test]
    fn test_standbys_never_replaced_by_primary() {
        for fallback in [false, true] {
            let set = resolve(
                Classification {
                    primary: Some(primary()),
                    standbys: standbys(),
                },
                fallback,
            );
            assert_eq!(set.standbys, standbys());
            assert!(!set.used_fallback);
            assert_eq!(set.primary, Some(primary()));
        }
    }

    #[test]
    fn test_fallback_to_primary() {
        let set = resolve(
            Classification {
                primary: Some(primary()),
                standbys: Vec::new(),
            },
            true,
        );
        assert_eq!(set.standbys, vec![primary()]);
        assert!(set.used_fallback);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_no_fallback_when_disabled() {
        let set = resolve(
            Classification {
                primary: Some(primary()),
                standbys: Vec::new(),
            },
            false,
        );
        assert!(set.is_empty());
        assert!(!set.used_fallback);
    }

    #[test]
    fn test_no_fallback_without_healthy_primary() {
        let set = resolve(Classification::default(), true);
        assert!(set.is_empty());
        assert!(!set.used_fallback);
        assert_eq!(set.primary, None);
    }

    #[test]
    fn test_standby_list() {
        let set = resolve(
            Classification {
                primary: None,
                standbys: standbys(),
            },
            false,
        );
        assert_eq!(set.standby_list(), vec!["10.0.0.2:5432", "10.0.0.3:5432"]);
    }

    #[test]
    fn test_changes_since_previous_set() {
        let previous = resolve(
            Classification {
                primary: Some(primary()),
                standbys: standbys(),
            },
            false,
        );
        let current = resolve(
            Classification {
                primary: Some(primary()),
                standbys: vec![
                    Endpoint::new("10.0.0.3", 5432),
                    Endpoint::new("10.0.0.4", 5432),
                ],
            },
            false,
        );

        let changes = current.changes_since(&previous);
        assert_eq!(changes.added, vec!["10.0.0.4:5432"]);
        assert_eq!(changes.removed, vec!["10.0.0.2:5432"]);
        assert_eq!(current.changes_since(&current), BackendChanges::default());

        let first = current.changes_since(&BackendSet::default());
        assert_eq!(first.added, vec!["10.0.0.3:5432", "10.0.0.4:5432"]);
        assert!(first.removed.is_empty());
    }
}
