//! # Connectivity Tracking
//!
//! Shared online/offline state for the store and the replay worker.
//!
//! ## State Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Connectivity Transitions                             │
//! │                                                                         │
//! │          remote call fails with Unavailable / times out                │
//! │   ┌────────────────────────────────────────────────────┐               │
//! │   │                                                    ▼               │
//! │  CONNECTED                                        DISCONNECTED         │
//! │   ▲                                                    │               │
//! │   └────────────────────────────────────────────────────┘               │
//! │          replay worker probe succeeds                                   │
//! │                                                                         │
//! │  The store starts optimistic (Connected): the first failing call       │
//! │  flips it. Watchers (the replay worker) observe transitions through    │
//! │  a tokio watch channel.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::watch;
use tracing::info;

/// Connection state of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Remote calls are being attempted directly.
    Connected,
    /// Mutations queue locally; the replay worker is probing.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Shared connectivity handle.
///
/// Cheap to clone; all clones observe and mutate the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<ConnectionState>,
}

impl Connectivity {
    /// Creates a new handle in the given initial state.
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _) = watch::channel(initial);
        Connectivity { tx }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Whether remote calls should currently be attempted.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Records a transition. Logs only actual changes.
    pub fn set_connected(&self, connected: bool) {
        let next = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, "Connectivity changed");
            *current = next;
            true
        });
    }

    /// Subscribes to state transitions (used by the replay worker).
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    /// Optimistic default: first failing call flips to disconnected.
    fn default() -> Self {
        Connectivity::new(ConnectionState::Connected)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
