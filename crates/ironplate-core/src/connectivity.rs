//! ============================================================================
//! Connectivity - Online/offline signal
//! ============================================================================
//! The platform (or the reachability probe) drives a `ConnectivitySignal`;
//! the sync coordinator watches it for transitions.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default timeout for a single reachability check
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Offline,
}

impl ConnectionStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Shared online/offline flag. Clones observe and drive the same state.
#[derive(Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_online(self.is_online())
    }

    /// Publish the current state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!("Connectivity changed: {}", ConnectionStatus::from_online(online));
        }
        changed
    }

    /// Receiver woken on every state change
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivitySignal {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Polls a health URL and feeds the result into a `ConnectivitySignal`.
/// Any HTTP response short of a server error counts as reachable.
pub struct ReachabilityProbe {
    client: reqwest::Client,
    url: String,
    period: Duration,
}

impl ReachabilityProbe {
    pub fn new(url: impl Into<String>, period: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            period,
        }
    }

    /// One reachability check
    pub async fn check(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!("Reachability check against {} failed: {}", self.url, e);
                false
            }
        }
    }

    /// Run the probe in the background until the handle is aborted
    pub fn spawn(self, signal: ConnectivitySignal) -> JoinHandle<()> {
        info!("Probing {} every {:?} for connectivity", self.url, self.period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            loop {
                interval.tick().await;
                let online = self.check().await;
                signal.set_online(online);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_reports_changes_only() {
        let signal = ConnectivitySignal::new(true);
        assert!(!signal.set_online(true));
        assert!(signal.set_online(false));
        assert!(!signal.is_online());
        assert_eq!(signal.status(), ConnectionStatus::Offline);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ConnectivitySignal::new(false);
        let platform = signal.clone();
        platform.set_online(true);
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_subscriber_sees_transition() {
        let signal = ConnectivitySignal::new(true);
        let mut rx = signal.subscribe();

        signal.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Online.to_string(), "online");
        assert_eq!(ConnectionStatus::from_online(false).to_string(), "offline");
    }

    #[tokio::test]
    async fn test_probe_unreachable_host_is_offline() {
        let probe = ReachabilityProbe::new("http://127.0.0.1:9/health", Duration::from_secs(30));
        assert!(!probe.check().await);
    }
}
