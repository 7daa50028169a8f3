//! Reactor: the event bus and the stores it feeds.
//!
//! DESIGN
//! ======
//! A `Reactor` is built once at startup and handed (by clone) to whatever
//! dispatches into it. Each store registers a reducer per event kind it
//! cares about. `dispatch` reduces one event through every interested store
//! to completion, under a single lock, before the next event is looked at.
//! Applied events are then broadcast so UI layers can re-read state.
//!
//! TRADE-OFFS
//! ==========
//! Stores are concrete fields rather than a dynamic registry. The set of
//! stores is fixed for this client and typed reads (`user()`, `status()`)
//! are worth more than runtime extensibility.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::invite::{self, Invite};
use crate::status::{self, Operation, RequestStatus, RequestStatuses};
use crate::user::{self, User, UserPayload};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// EVENTS
// =============================================================================

/// Everything that can be dispatched into the reactor.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ReceiveUser(UserPayload),
    ReceiveInvite(Invite),
    RequestStarted(Operation),
    RequestSucceeded(Operation),
    RequestFailed { operation: Operation, message: String },
    RequestCleared(Operation),
}

/// Registration key for reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReceiveUser,
    ReceiveInvite,
    RequestStarted,
    RequestSucceeded,
    RequestFailed,
    RequestCleared,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ReceiveUser(_) => EventKind::ReceiveUser,
            Self::ReceiveInvite(_) => EventKind::ReceiveInvite,
            Self::RequestStarted(_) => EventKind::RequestStarted,
            Self::RequestSucceeded(_) => EventKind::RequestSucceeded,
            Self::RequestFailed { .. } => EventKind::RequestFailed,
            Self::RequestCleared(_) => EventKind::RequestCleared,
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Computes the next state from the current state and an event.
pub type Reducer<S> = fn(&S, &Event) -> S;

/// State plus the reducers registered for it.
pub struct Store<S> {
    initial: S,
    state: S,
    handlers: HashMap<EventKind, Reducer<S>>,
}

impl<S: Clone> Store<S> {
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self { state: initial.clone(), initial, handlers: HashMap::new() }
    }

    /// Register `reducer` for events of `kind`.
    #[must_use]
    pub fn on(mut self, kind: EventKind, reducer: Reducer<S>) -> Self {
        self.handlers.insert(kind, reducer);
        self
    }

    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Reduce `event` if a handler is registered. Returns whether it was.
    pub fn apply(&mut self, event: &Event) -> bool {
        let Some(reducer) = self.handlers.get(&event.kind()) else {
            return false;
        };
        self.state = reducer(&self.state, event);
        true
    }

    fn reset(&mut self) {
        self.state = self.initial.clone();
    }
}

struct Stores {
    user: Store<Option<User>>,
    invite: Store<Option<Invite>>,
    requests: Store<RequestStatuses>,
}

impl Stores {
    fn new() -> Self {
        Self {
            user: Store::new(None).on(EventKind::ReceiveUser, user::receive_user),
            invite: Store::new(None).on(EventKind::ReceiveInvite, invite::receive_invite),
            requests: Store::new(RequestStatuses::default())
                .on(EventKind::RequestStarted, status::request_started)
                .on(EventKind::RequestSucceeded, status::request_succeeded)
                .on(EventKind::RequestFailed, status::request_failed)
                .on(EventKind::RequestCleared, status::request_cleared),
        }
    }

    fn apply(&mut self, event: &Event) -> bool {
        let user = self.user.apply(event);
        let invite = self.invite.apply(event);
        let requests = self.requests.apply(event);
        user || invite || requests
    }
}

// =============================================================================
// REACTOR
// =============================================================================

/// Process-wide event bus owning the client stores.
#[derive(Clone)]
pub struct Reactor {
    stores: Arc<Mutex<Stores>>,
    events: broadcast::Sender<Event>,
}

impl Reactor {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { stores: Arc::new(Mutex::new(Stores::new())), events }
    }

    /// Reduce `event` through every registered store, then broadcast it.
    pub fn dispatch(&self, event: Event) {
        let handled = {
            let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
            stores.apply(&event)
        };
        if !handled {
            tracing::warn!(kind = ?event.kind(), "event dispatched with no registered store");
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Mark `operation` in flight unless it already is.
    ///
    /// The check and the transition happen under the same lock, so two
    /// overlapping callers cannot both start the same operation.
    pub fn begin_request(&self, operation: Operation) -> bool {
        let event = Event::RequestStarted(operation);
        {
            let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
            if stores.requests.state().get(operation).is_in_flight() {
                return false;
            }
            stores.apply(&event);
        }
        let _ = self.events.send(event);
        true
    }

    /// Receive every event applied from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.read(|stores| stores.user.state().clone())
    }

    #[must_use]
    pub fn invite(&self) -> Option<Invite> {
        self.read(|stores| stores.invite.state().clone())
    }

    #[must_use]
    pub fn status(&self, operation: Operation) -> RequestStatus {
        self.read(|stores| stores.requests.state().get(operation))
    }

    /// Drop all state back to initial values (session reset).
    pub fn reset(&self) {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.user.reset();
        stores.invite.reset();
        stores.requests.reset();
    }

    fn read<T>(&self, f: impl FnOnce(&Stores) -> T) -> T {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        f(&stores)
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "reactor_test.rs"]
mod tests;
