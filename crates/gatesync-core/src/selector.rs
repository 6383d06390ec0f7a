use std::sync::Arc;

use eyre::Result;

use crate::client::RemoteClient;
use crate::config::HostDescriptor;
use crate::errors::SyncError;
use crate::probe::ReachabilityProbe;
use crate::session::SessionConnector;

/// Progress of a host selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorState {
    /// No selection has run yet.
    Idle,
    /// Hosts probed so far, in order, none of them reachable.
    Probing { attempted: Vec<String> },
    /// A client was bound to `hostname` after probing `attempted`.
    Bound {
        hostname: String,
        attempted: Vec<String>,
    },
}

/// Picks the first reachable host from an ordered candidate pool.
///
/// Order is priority: the first host that answers wins, regardless of latency,
/// and no later candidate is probed.
pub struct HostSelector {
    probe: Arc<dyn ReachabilityProbe>,
    connector: Arc<dyn SessionConnector>,
    state: SelectorState,
}

impl HostSelector {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            probe,
            connector,
            state: SelectorState::Idle,
        }
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    /// Probe `candidates` in order and bind a client to the first one that
    /// answers. A host without a per-host username and no `fallback_username`
    /// is a configuration error, raised before that host is probed.
    pub fn select(
        &mut self,
        candidates: &[HostDescriptor],
        fallback_username: Option<&str>,
    ) -> Result<RemoteClient> {
        let mut attempted: Vec<String> = Vec::with_capacity(candidates.len());
        self.state = SelectorState::Probing {
            attempted: attempted.clone(),
        };

        for (index, host) in candidates.iter().enumerate() {
            let username = host.effective_username(fallback_username).ok_or_else(|| {
                SyncError::configuration(
                    "no username configured for this host and no fallback username given",
                    Some(host.hostname.clone()),
                )
            })?;

            log::info!(
                "checking if host {} ({}) is available...",
                index + 1,
                host.hostname
            );
            attempted.push(host.hostname.clone());
            self.state = SelectorState::Probing {
                attempted: attempted.clone(),
            };

            if self.probe.is_reachable(&host.hostname) {
                log::info!("{} is available", host.hostname);
                self.state = SelectorState::Bound {
                    hostname: host.hostname.clone(),
                    attempted,
                };
                return Ok(RemoteClient::new(
                    username,
                    host.hostname.clone(),
                    host.port_or_default(),
                    host.os_kind,
                    Arc::clone(&self.connector),
                    Arc::clone(&self.probe),
                ));
            }
            log::debug!("{} did not answer", host.hostname);
        }

        Err(SyncError::no_reachable_host(&attempted).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{category_of, ErrorCategory};
    use crate::os_kind::OsKind;
    use crate::session::RemoteSession;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakePing {
        up: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl FakePing {
        fn new(up: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                up: up.iter().map(|h| h.to_string()).collect(),
                probed: Mutex::new(Vec::new()),
            })
        }
    }

    impl ReachabilityProbe for FakePing {
        fn is_reachable(&self, hostname: &str) -> bool {
            self.probed.lock().unwrap().push(hostname.to_string());
            self.up.contains(hostname)
        }
    }

    struct NoSessions;

    impl SessionConnector for NoSessions {
        fn connect(&self, _: &str, hostname: &str, _: u16) -> Result<Box<dyn RemoteSession>> {
            eyre::bail!("unexpected connection to {hostname}")
        }
    }

    fn hosts(names: &[&str]) -> Vec<HostDescriptor> {
        names
            .iter()
            .map(|name| HostDescriptor::new(None, *name, OsKind::Posix))
            .collect()
    }

    fn selector(ping: &Arc<FakePing>) -> HostSelector {
        let probe: Arc<dyn ReachabilityProbe> = ping.clone();
        HostSelector::new(probe, Arc::new(NoSessions))
    }

    #[test]
    fn first_reachable_host_wins() {
        let ping = FakePing::new(&["reachable3", "reachable4"]);
        let mut selector = selector(&ping);
        let client = selector
            .select(
                &hosts(&["unreachable1", "unreachable2", "reachable3", "reachable4"]),
                Some("me"),
            )
            .unwrap();

        assert_eq!(client.hostname(), "reachable3");
        assert_eq!(client.username(), "me");
        assert!(!client.is_connected());
        assert_eq!(
            *ping.probed.lock().unwrap(),
            vec!["unreachable1", "unreachable2", "reachable3"]
        );
        assert!(matches!(
            selector.state(),
            SelectorState::Bound { hostname, .. } if hostname == "reachable3"
        ));
    }

    #[test]
    fn all_unreachable_names_every_host() {
        let ping = FakePing::new(&[]);
        let mut selector = selector(&ping);
        let err = selector
            .select(&hosts(&["alpha", "beta", "gamma"]), Some("me"))
            .unwrap_err();

        assert_eq!(category_of(&err), Some(ErrorCategory::Connectivity));
        let message = err.to_string();
        for host in ["alpha", "beta", "gamma"] {
            assert!(message.contains(host), "{message} should name {host}");
        }
        assert_eq!(
            selector.state(),
            &SelectorState::Probing {
                attempted: vec!["alpha".into(), "beta".into(), "gamma".into()]
            }
        );
    }

    #[test]
    fn missing_username_is_a_configuration_error() {
        let ping = FakePing::new(&["alpha"]);
        let mut selector = selector(&ping);
        let err = selector.select(&hosts(&["alpha"]), None).unwrap_err();
        assert_eq!(category_of(&err), Some(ErrorCategory::Configuration));
        assert!(ping.probed.lock().unwrap().is_empty());
    }

    #[test]
    fn per_host_username_and_port_are_used() {
        let ping = FakePing::new(&["nas"]);
        let mut selector = selector(&ping);
        let mut candidates = hosts(&["nas"]);
        candidates[0].username = Some("root".into());
        candidates[0].port = Some(2222);
        let client = selector.select(&candidates, Some("me")).unwrap();
        assert_eq!(client.username(), "root");
        assert_eq!(client.port(), 2222);
        assert_eq!(client.remote_os(), OsKind::Posix);
    }
}
