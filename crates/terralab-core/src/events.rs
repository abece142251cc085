//! Session event bus
//!
//! Typed in-process pub/sub for session lifecycle events. Producers (the
//! HTTP client, the auth session, the sync agent) publish through the
//! [`SessionEvents`] port; the host registers subscribers on a
//! [`CallbackEventBus`] instance it constructs once and injects
//! everywhere. There is no ambient global channel.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A session lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    /// A login completed and tokens were persisted
    LoggedIn,
    /// The user logged out; local state has been cleared
    LoggedOut,
    /// A token refresh failed and local credentials were cleared
    SessionExpired,
    /// A token refresh succeeded
    TokenRefreshed,
    /// A mutating request was persisted for later sync
    RequestQueued {
        /// Id assigned by the request queue
        id: i64,
    },
    /// A queued request was successfully replayed and removed
    RequestReplayed {
        /// Id of the replayed record
        id: i64,
    },
}

/// Port for publishing session events
///
/// Producers only publish; subscription is an affordance of the concrete
/// bus the host owns. Publishing must never fail or block the caller.
pub trait SessionEvents: Send + Sync {
    /// Delivers an event to all current subscribers
    fn publish(&self, event: SessionEvent);
}

type Subscriber = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// In-process event bus with callback subscribers
///
/// Subscribers run synchronously on the publisher's task; they are
/// expected to be cheap (set a flag, send on a channel). A panicking
/// subscriber is the host's bug; the bus does not catch panics.
#[derive(Default)]
pub struct CallbackEventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl CallbackEventBus {
    /// Creates an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for all future events
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Box::new(callback));
    }
}

impl SessionEvents for CallbackEventBus {
    fn publish(&self, event: SessionEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }
}

/// Event sink that drops everything
///
/// Useful for tests and for hosts that do not care about events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl SessionEvents for NullEvents {
    fn publish(&self, event: SessionEvent) {
        debug!(event = ?event, "Session event dropped");
    }
}
