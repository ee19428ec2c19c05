//! # Lifecycle Bridge
//!
//! Translates the two external signal sources — the auth collaborator's
//! identity changes and the host environment's foreground/background
//! transitions — into connection manager calls. Any host (OS app-state
//! notifications, browser visibility, a daemon's signal handler) can feed
//! these methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::observability::Logger;

use super::connection::{ConnectionManager, ConnectionStatus};
use super::identity::StaffId;

/// Bridges identity and app-state signals to the connection manager
pub struct LifecycleBridge {
    manager: Arc<ConnectionManager>,
    foregrounded: AtomicBool,
}

impl LifecycleBridge {
    /// Create a bridge. The app is assumed to start in the foreground.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            foregrounded: AtomicBool::new(true),
        }
    }

    /// Identity became available, changed, or was cleared.
    ///
    /// Present identity connects (a swap tears down the old channel but
    /// keeps registrations); cleared identity disconnects and destroys all
    /// registrations.
    pub fn on_identity_change(&self, staff: Option<StaffId>) {
        match staff {
            Some(staff) => {
                Logger::info("LIFECYCLE_IDENTITY_PRESENT", &[("staff", &staff.to_string())]);
                self.manager.connect_as(staff);
            }
            None => {
                Logger::info("LIFECYCLE_IDENTITY_CLEARED", &[]);
                self.manager.reset();
            }
        }
    }

    /// The app returned to the foreground.
    ///
    /// Reconnects only from `disconnected` with an identity present — the
    /// case where the OS suspended timers and sockets while backgrounded.
    /// A foreground `error` state is left to the retry scheduler.
    pub fn on_app_foreground(&self) {
        let was_foregrounded = self.foregrounded.swap(true, Ordering::SeqCst);
        if was_foregrounded {
            return;
        }

        if self.manager.status() == ConnectionStatus::Disconnected
            && self.manager.identity().is_some()
        {
            Logger::info("LIFECYCLE_FOREGROUND_RECONNECT", &[]);
            self.manager.connect();
        }
    }

    /// The app moved to the background. No connection action; the OS owns
    /// socket survival from here.
    pub fn on_app_background(&self) {
        self.foregrounded.store(false, Ordering::SeqCst);
        Logger::debug("LIFECYCLE_BACKGROUNDED", &[]);
    }
}
