//! Connectivity tracking.
//!
//! The monitor decides *when* passes run. Going online schedules a pass
//! after a short debounce window so a flapping connection does not cause a
//! burst of passes. Going offline cancels that scheduled pass.

use crate::clock::now_millis;
use crate::config::NetworkDetectionConfig;
use crate::events::{EventBus, SyncEvent};
use crate::timer::Timer;
use crate::transport::{Transport, TransportRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Tracks whether the server is reachable.
pub struct NetworkMonitor {
    online: AtomicBool,
    events: Arc<EventBus>,
    reconnect: Timer,
    reconnect_delay: Duration,
    trigger: Arc<Notify>,
    health_check: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Creates a monitor. `trigger` is notified whenever a pass should run.
    pub fn new(
        online: bool,
        reconnect_delay: Duration,
        events: Arc<EventBus>,
        trigger: Arc<Notify>,
    ) -> Self {
        Self {
            online: AtomicBool::new(online),
            events,
            reconnect: Timer::new(),
            reconnect_delay,
            trigger,
            health_check: Mutex::new(None),
        }
    }

    /// Returns true if the server is believed reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a connectivity change. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }

        let timestamp = now_millis();
        if online {
            info!(delay_ms = self.reconnect_delay.as_millis() as u64, "network online");
            self.events.emit(SyncEvent::NetworkOnline { timestamp });
            let trigger = Arc::clone(&self.trigger);
            if !self
                .reconnect
                .schedule(self.reconnect_delay, move || trigger.notify_one())
            {
                self.trigger.notify_one();
            }
        } else {
            self.reconnect.cancel();
            info!("network offline");
            self.events.emit(SyncEvent::NetworkOffline { timestamp });
        }
        true
    }

    /// Returns true if a reconnect pass is scheduled but has not fired.
    pub fn has_scheduled_sync(&self) -> bool {
        self.reconnect.is_pending()
    }

    /// Probes the configured endpoints once and records the result.
    ///
    /// Returns whether the server was reachable. With no endpoints
    /// configured nothing is probed and the current state is returned
    /// unchanged.
    pub async fn check_now<T: Transport>(
        &self,
        transport: &T,
        config: &NetworkDetectionConfig,
    ) -> bool {
        if config.endpoints.is_empty() {
            debug!("no health-check endpoints, keeping connectivity state");
            return self.is_online();
        }
        let reachable = probe(transport, &config.endpoints, config.timeout).await;
        self.set_online(reachable);
        reachable
    }

    /// Starts periodic health checks. Replaces any running checker.
    ///
    /// Returns false when called outside a tokio runtime.
    pub fn start_health_checks<T: Transport>(
        self: &Arc<Self>,
        transport: Arc<T>,
        config: NetworkDetectionConfig,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let monitor: Weak<Self> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(config.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable =
                    probe(transport.as_ref(), &config.endpoints, config.timeout).await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.set_online(reachable);
            }
        });

        if let Some(previous) = self.health_check.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Returns true while periodic health checks are running.
    pub fn is_checking(&self) -> bool {
        self.health_check
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stops health checks and cancels any scheduled reconnect pass.
    pub fn stop(&self) {
        self.reconnect.cancel();
        if let Some(handle) = self.health_check.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.health_check.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("scheduled_sync", &self.has_scheduled_sync())
            .finish()
    }
}

/// Any HTTP response from any endpoint counts as reachable.
async fn probe<T: Transport>(transport: &T, endpoints: &[String], timeout: Duration) -> bool {
    for endpoint in endpoints {
        let mut request = TransportRequest::get(endpoint.as_str());
        request.timeout = Some(timeout);
        match tokio::time::timeout(timeout, transport.request(request)).await {
            Ok(Ok(response)) => {
                debug!(endpoint = %endpoint, status = response.status, "health check answered");
                return true;
            }
            Ok(Err(e)) => debug!(endpoint = %endpoint, error = %e, "health check failed"),
            Err(_) => debug!(endpoint = %endpoint, "health check timed out"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::EventKind;
    use crate::transport::MockTransport;

    fn monitor(online: bool) -> (Arc<NetworkMonitor>, Arc<Notify>, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(16));
        let trigger = Arc::new(Notify::new());
        let monitor = Arc::new(NetworkMonitor::new(
            online,
            Duration::from_secs(1),
            events.clone(),
            trigger.clone(),
        ));
        (monitor, trigger, events)
    }

    fn health_config() -> NetworkDetectionConfig {
        NetworkDetectionConfig::default()
            .with_health_checks(vec!["/health".into()], Duration::from_secs(10))
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn online_transition_schedules_debounced_pass() {
        let (monitor, trigger, events) = monitor(false);
        let mut sub = events.subscribe();

        assert!(monitor.set_online(true));
        assert!(!monitor.set_online(true));
        assert!(monitor.is_online());
        assert!(monitor.has_scheduled_sync());
        assert!(matches!(sub.try_recv(), Some(SyncEvent::NetworkOnline { .. })));
        assert!(sub.try_recv().is_none());

        tokio::time::timeout(Duration::from_millis(1_100), trigger.notified())
            .await
            .expect("reconnect pass should be triggered");
        assert!(!monitor.has_scheduled_sync());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_cancels_scheduled_pass() {
        let (monitor, trigger, events) = monitor(false);
        let mut sub = events.subscribe().only([EventKind::NetworkOffline]);

        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(monitor.set_online(false));

        assert!(!monitor.has_scheduled_sync());
        assert!(matches!(sub.try_recv(), Some(SyncEvent::NetworkOffline { .. })));
        let fired = tokio::time::timeout(Duration::from_secs(5), trigger.notified()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn check_now_follows_transport() {
        let (monitor, _trigger, _events) = monitor(true);
        let transport = MockTransport::new();

        transport.push_error(SyncError::transport_retryable("refused"));
        assert!(!monitor.check_now(&transport, &health_config()).await);
        assert!(!monitor.is_online());

        transport.push_response(crate::transport::TransportResponse::new(
            503,
            serde_json::Value::Null,
        ));
        assert!(monitor.check_now(&transport, &health_config()).await);
        assert!(monitor.is_online());
        assert_eq!(transport.requests()[0].url, "/health");
        assert_eq!(transport.requests()[0].timeout, Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn check_without_endpoints_keeps_state() {
        let (monitor, trigger, _events) = monitor(false);
        let transport = MockTransport::new();
        let unconfigured = NetworkDetectionConfig::default();

        monitor.set_online(true);
        assert!(monitor.check_now(&transport, &unconfigured).await);
        assert!(monitor.is_online());
        assert!(monitor.has_scheduled_sync());
        assert_eq!(transport.request_count(), 0);

        tokio::time::timeout(Duration::from_millis(1_100), trigger.notified())
            .await
            .expect("reconnect pass should still fire");

        monitor.set_online(false);
        assert!(!monitor.check_now(&transport, &unconfigured).await);
        assert!(!monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out() {
        let (monitor, _trigger, _events) = monitor(true);
        let transport = MockTransport::new();
        transport.set_delay(Duration::from_secs(10));

        assert!(!monitor.check_now(&transport, &health_config()).await);
        assert!(!monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_checks_detect_silent_loss() {
        let (monitor, _trigger, _events) = monitor(true);
        let transport = Arc::new(MockTransport::new());
        transport.set_offline(true);

        assert!(monitor.start_health_checks(transport.clone(), health_config()));
        assert!(monitor.is_checking());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!monitor.is_online());

        transport.set_offline(false);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(monitor.is_online());

        monitor.stop();
        assert!(!monitor.is_checking());
        assert!(!monitor.has_scheduled_sync());
    }
}
