/*!
Teleoperation alert fan-out to registered listeners
*/

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, warn};

use fleetlink_protocol::Alert;

/// Receives every alert dispatched through an `AlertHub`
pub trait AlertListener: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

impl<F> AlertListener for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn on_alert(&self, alert: &Alert) {
        self(alert)
    }
}

/// Token identifying one registration, used to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Log tier an alert is reported at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    Advisory,
    /// Needs an operator now
    Critical,
}

impl AlertTier {
    pub const CRITICAL_SEVERITY: i32 = 3;

    /// `>= 3` is critical, anything else (including out-of-range values) advisory
    pub fn classify(severity: i32) -> Self {
        if severity >= Self::CRITICAL_SEVERITY {
            AlertTier::Critical
        } else {
            AlertTier::Advisory
        }
    }
}

struct Registration {
    handle: ListenerHandle,
    listener: Arc<dyn AlertListener>,
}

/// Logs incoming alerts by severity and hands each one to every listener,
/// synchronously and in registration order.
#[derive(Default)]
pub struct AlertHub {
    listeners: RwLock<Vec<Registration>>,
    next_handle: AtomicU64,
}

impl fmt::Debug for AlertHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl AlertHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Registering the same listener twice delivers twice.
    pub fn register<L>(&self, listener: L) -> ListenerHandle
    where
        L: AlertListener + 'static,
    {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration {
            handle,
            listener: Arc::new(listener),
        });
        handle
    }

    /// Remove one registration. Returns false for unknown handles.
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| registration.handle != handle);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Log `alert` at its tier, then call every listener registered so far.
    ///
    /// The listener list is copied before any listener runs, so listeners may
    /// register or unregister on this hub; changes apply from the next
    /// dispatch. A listener that panics or blocks is not contained.
    pub fn dispatch(&self, alert: &Alert) -> AlertTier {
        let tier = AlertTier::classify(alert.severity);
        match tier {
            AlertTier::Critical => error!(
                vehicle_id = %alert.vehicle_id,
                reason = %alert.reason,
                severity = alert.severity,
                latitude = alert.latitude,
                longitude = alert.longitude,
                "🚨 critical teleoperation alert"
            ),
            AlertTier::Advisory => warn!(
                vehicle_id = %alert.vehicle_id,
                reason = %alert.reason,
                severity = alert.severity,
                "teleoperation advisory"
            ),
        }
        if !(1..=AlertTier::CRITICAL_SEVERITY).contains(&alert.severity) {
            debug!(
                severity = alert.severity,
                ?tier,
                "alert severity outside 1..=3"
            );
        }

        let listeners: Vec<Arc<dyn AlertListener>> = self
            .listeners
            .read()
            .iter()
            .map(|registration| Arc::clone(&registration.listener))
            .collect();

        for listener in &listeners {
            listener.on_alert(alert);
        }
        tier
    }
}
