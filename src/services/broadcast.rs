//! Channel registry — setlist id to broadcast channel bindings.
//!
//! DESIGN
//! ======
//! Decouples "a mutation happened" from "deliver it to listeners". Each live
//! setlist has at most one `tokio::sync::broadcast` channel; the channel's
//! own fan-out delivers to every subscribed connection, so the registry keeps
//! one binding per setlist, not one per connection. The gateway claims the
//! channel on first connection open and later connections subscribe to the
//! same sender.
//!
//! ERROR HANDLING
//! ==============
//! Publishing is best-effort and never fails the originating mutation. A
//! publish with no binding is logged and skipped; a send into a channel whose
//! receivers are all gone is logged and swallowed. Lagged receivers drop
//! missed events on their own side (at-most-once delivery).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{Actor, BroadcastEvent};
use crate::services::presence::UserPresence;
use crate::services::setlist::{SetItem, SetSection, Setlist};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

fn channel_capacity() -> usize {
    std::env::var("SETLIST_CHANNEL_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Maps each live setlist to the channel that fans events out to its viewers.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<Mutex<HashMap<Uuid, broadcast::Sender<BroadcastEvent>>>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, broadcast::Sender<BroadcastEvent>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Install a delivery channel for a setlist, silently replacing any prior
    /// binding. Only the latest binding receives subsequent publishes.
    pub fn register_publisher(&self, setlist_id: Uuid, sender: broadcast::Sender<BroadcastEvent>) {
        let replaced = self.lock().insert(setlist_id, sender).is_some();
        if replaced {
            debug!(%setlist_id, "channel binding replaced");
        }
    }

    /// Gateway path: return the setlist's channel, creating and registering
    /// one if this is the first connection to claim it.
    pub fn get_or_create(&self, setlist_id: Uuid) -> broadcast::Sender<BroadcastEvent> {
        self.lock()
            .entry(setlist_id)
            .or_insert_with(|| broadcast::channel(channel_capacity()).0)
            .clone()
    }

    /// Remove the binding. Later publishes for this setlist become no-ops.
    pub fn unregister_publisher(&self, setlist_id: Uuid) {
        self.lock().remove(&setlist_id);
    }

    /// Whether a binding currently exists. Read-only, used by the gateway's
    /// close path and by tests.
    #[must_use]
    pub fn has_publisher(&self, setlist_id: Uuid) -> bool {
        self.lock().contains_key(&setlist_id)
    }

    /// Deliver an event to the channel bound to `event.setlist_id()`.
    ///
    /// Never returns an error: a missing binding or a dead channel is logged
    /// and swallowed so the mutation that triggered the publish cannot fail
    /// or roll back here.
    pub fn publish(&self, event: &BroadcastEvent) {
        let setlist_id = event.setlist_id();
        let sender = {
            let bindings = self.lock();
            bindings.get(&setlist_id).cloned()
        };

        let Some(sender) = sender else {
            debug!(%setlist_id, kind = event.kind(), "publish skipped: no subscriber");
            return;
        };

        if let Err(e) = sender.send(event.clone()) {
            warn!(%setlist_id, kind = event.kind(), error = %e, "publish delivery failed");
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// DOMAIN EVENT CONVENIENCES
// =============================================================================

/// One method per event kind. Each stamps the timestamp at construction and
/// delegates to `publish`; the domain service calls these after a successful
/// persisted mutation.
impl ChannelRegistry {
    pub fn item_added(&self, setlist_id: Uuid, item: SetItem, actor: &Actor) {
        self.publish(&BroadcastEvent::item_added(setlist_id, item, actor));
    }

    pub fn item_updated(&self, setlist_id: Uuid, item: SetItem, actor: &Actor) {
        self.publish(&BroadcastEvent::item_updated(setlist_id, item, actor));
    }

    pub fn item_deleted(&self, setlist_id: Uuid, item_id: Uuid, actor: &Actor) {
        self.publish(&BroadcastEvent::item_deleted(setlist_id, item_id, actor));
    }

    pub fn reordered(&self, setlist_id: Uuid, items: Vec<SetItem>, actor: &Actor) {
        self.publish(&BroadcastEvent::reordered(setlist_id, items, actor));
    }

    pub fn section_added(&self, setlist_id: Uuid, section: SetSection, actor: &Actor) {
        self.publish(&BroadcastEvent::section_added(setlist_id, section, actor));
    }

    pub fn section_updated(&self, setlist_id: Uuid, section: SetSection, actor: &Actor) {
        self.publish(&BroadcastEvent::section_updated(setlist_id, section, actor));
    }

    pub fn section_deleted(&self, setlist_id: Uuid, section_id: Uuid, actor: &Actor) {
        self.publish(&BroadcastEvent::section_deleted(setlist_id, section_id, actor));
    }

    pub fn setlist_updated(&self, setlist_id: Uuid, setlist: Setlist, actor: &Actor) {
        self.publish(&BroadcastEvent::setlist_updated(setlist_id, setlist, actor));
    }

    pub fn presence_update(&self, setlist_id: Uuid, presence: Vec<UserPresence>) {
        self.publish(&BroadcastEvent::presence_update(setlist_id, presence));
    }
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
