//! Session registry — socket handle → owning session.
//!
//! A transport receive notification carries nothing but the socket handle.
//! The registry turns that handle back into the session that owns the
//! socket, so one callback shape serves every session of a type.
//!
//! Servers and clients each get their own registry; handles are only
//! unique within a transport, not across session types.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use trickle_core::{ReceiveCallback, SessionError, SocketHandle};

/// A session that can be told "a datagram is waiting on this socket".
pub trait Receivable: Send + Sync {
    fn on_receive(&self, handle: SocketHandle) -> Result<(), SessionError>;
}

/// Shared handle → session table. Cloning shares the table.
pub struct SessionRegistry<S: ?Sized> {
    entries: Arc<DashMap<SocketHandle, Arc<S>>>,
}

impl<S: ?Sized> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: ?Sized> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Associate `handle` with `session`. A handle maps to at most one session.
    pub fn register(&self, handle: SocketHandle, session: Arc<S>) -> Result<(), SessionError> {
        match self.entries.entry(handle) {
            Entry::Occupied(_) => Err(SessionError::HandleInUse(handle)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// The session owning `handle`.
    pub fn lookup(&self, handle: SocketHandle) -> Result<Arc<S>, SessionError> {
        self.entries
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::UnknownHandle(handle))
    }

    pub fn unregister(&self, handle: SocketHandle) -> Option<Arc<S>> {
        self.entries.remove(&handle).map(|(_, session)| session)
    }

    pub fn contains(&self, handle: SocketHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Receivable + ?Sized + 'static> SessionRegistry<S> {
    /// Route a receive notification to the owning session.
    pub fn dispatch(&self, handle: SocketHandle) -> Result<(), SessionError> {
        // Clone out of the map first; the session may re-enter the registry.
        let session = self.lookup(handle)?;
        session.on_receive(handle)
    }

    /// The callback to install on every socket of this session type.
    pub fn receive_callback(&self) -> ReceiveCallback {
        let registry = self.clone();
        Arc::new(move |handle| registry.dispatch(handle))
    }
}
