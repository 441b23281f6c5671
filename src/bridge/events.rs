//! Event listener registry for the synthetic response.
//!
//! The middleware chain hangs its own bookkeeping off the response object
//! (`finish` hooks, close handlers). This registry implements the subset of
//! the event-emitter interface it relies on.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::response::LegacyResponse;

/// A registered event callback.
///
/// The emitting response is passed in, so a listener never needs to own a
/// clone of it. A listener that does capture one keeps the exchange alive
/// until the registry is cleared.
pub type Listener = Arc<dyn Fn(&LegacyResponse, &[String]) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    listener: Listener,
    once: bool,
}

/// Ordered listener lists keyed by event name.
#[derive(Default)]
pub struct EventRegistry {
    events: HashMap<String, Vec<Registration>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a persistent listener.
    pub fn on(&mut self, event: &str, listener: Listener) {
        self.push(event, listener, false);
    }

    /// Append a listener that is dropped after its first emit.
    pub fn once(&mut self, event: &str, listener: Listener) {
        self.push(event, listener, true);
    }

    fn push(&mut self, event: &str, listener: Listener, once: bool) {
        self.events
            .entry(event.to_string())
            .or_default()
            .push(Registration { listener, once });
    }

    /// Remove the first registration of `listener` for `event`, compared by identity.
    pub fn remove_listener(&mut self, event: &str, listener: &Listener) {
        if let Some(list) = self.events.get_mut(event) {
            if let Some(index) = list.iter().position(|r| Arc::ptr_eq(&r.listener, listener)) {
                list.remove(index);
            }
            if list.is_empty() {
                self.events.remove(event);
            }
        }
    }

    /// Remove every listener for `event`, or for all events when `None`.
    pub fn remove_all_listeners(&mut self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.events.remove(event);
            }
            None => self.events.clear(),
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    /// Snapshot the listeners to run for one emit and retire `once` registrations.
    ///
    /// Callers invoke the returned listeners after releasing whatever lock
    /// guards the registry, so a listener may re-enter the response.
    pub fn take_for_emit(&mut self, event: &str) -> Vec<Listener> {
        let Some(list) = self.events.get_mut(event) else {
            return Vec::new();
        };
        let listeners = list.iter().map(|r| r.listener.clone()).collect();
        list.retain(|r| !r.once);
        if list.is_empty() {
            self.events.remove(event);
        }
        listeners
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .events
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventRegistry").field("listeners", &counts).finish()
    }
}
