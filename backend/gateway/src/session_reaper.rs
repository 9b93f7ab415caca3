//! Session reaper: evicts sessions nobody has touched for `idle_timeout`.
//!
//! Sessions survive their sharer's disconnect so a phone can come back after
//! a network drop; this sweep is what eventually frees the abandoned ones.

use std::time::Duration;

use chrono::{DateTime, Utc};
use locshare_core::{SessionToken, SharedRelay};
use logging::mask_token;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::broadcaster::Broadcaster;
use crate::ws_protocol::ServerEvent;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct SessionReaper {
    relay: SharedRelay,
    broadcaster: Broadcaster,
    /// Inactivity after which a session is removed.
    pub idle_timeout: Duration,
    /// Time between sweeps.
    pub sweep_interval: Duration,
}

impl SessionReaper {
    pub fn new(relay: SharedRelay, broadcaster: Broadcaster) -> Self {
        Self {
            relay,
            broadcaster,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Run one sweep as of `now`. Returns the removed tokens.
    ///
    /// The idle check, the removal and the binding cleanup share one
    /// critical section, so an update that lands first always wins.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Vec<SessionToken> {
        let expired: Vec<(SessionToken, Vec<_>)> = {
            let mut guard = self.relay.lock().await;
            let relay = &mut *guard;
            relay
                .sessions
                .sweep_idle(now, self.idle_timeout)
                .into_iter()
                .map(|token| {
                    let stale = relay.connections.unbind_session(&token);
                    (token, stale)
                })
                .collect()
        };

        for (token, stale) in &expired {
            if !stale.is_empty() {
                debug!(session = %mask_token(token.as_str()), bindings = stale.len(), "dropped bindings of reaped session");
            }
            for connection in stale {
                self.broadcaster
                    .send_to(*connection, ServerEvent::session_expired(token.clone()))
                    .await;
            }
        }

        expired.into_iter().map(|(token, _)| token).collect()
    }

    /// Spawn the periodic sweep on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "session reaper started"
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let reaped = self.sweep_once(Utc::now()).await;
                if !reaped.is_empty() {
                    info!("[SessionReaper] Reaped {} idle sessions", reaped.len());
                }
            }
        })
    }
}
