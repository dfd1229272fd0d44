use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, Mutex};

/// Handle to one call's media transport. Frames queued here are written to
/// the caller-facing WebSocket by the media loop.
pub type ConnectionHandle = mpsc::Sender<Message>;

#[derive(Default)]
struct RegistryInner {
    handles: HashMap<String, ConnectionHandle>,
    /// Call id of the most recent registration. The outbound adapter sends
    /// to this handle; ACS is authoritative for which call is in progress.
    active: Option<String>,
}

/// Registry of media connection handles, keyed by call connection id.
///
/// A single active call means a single entry in practice, but the keying
/// lets the webhook clear exactly the call that disconnected.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
        }
    }

    /// Register the media handle for a call. Last registration wins — a
    /// re-register for the same call replaces the old handle outright.
    pub async fn register(&self, call_id: &str, handle: ConnectionHandle) {
        let mut inner = self.inner.lock().await;
        inner.handles.insert(call_id.to_string(), handle);
        inner.active = Some(call_id.to_string());
        tracing::info!(call_id = %call_id, "Media connection registered");
    }

    /// Drop the handle for a call so later sends fail cleanly instead of
    /// writing to a stale channel.
    pub async fn clear(&self, call_id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.handles.remove(call_id).is_some() {
            tracing::info!(call_id = %call_id, "Media connection cleared");
        }
        if inner.active.as_deref() == Some(call_id) {
            inner.active = None;
        }
    }

    /// Handle for the call currently in progress, read lazily on each send.
    pub async fn active_handle(&self) -> Option<ConnectionHandle> {
        let inner = self.inner.lock().await;
        inner
            .active
            .as_ref()
            .and_then(|id| inner.handles.get(id).cloned())
    }

    pub async fn get(&self, call_id: &str) -> Option<ConnectionHandle> {
        self.inner.lock().await.handles.get(call_id).cloned()
    }
}

/// Lifecycle state of a call, mirrored from webhook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Call placed, not yet answered.
    Dialing,
    Connected,
    Streaming,
    StreamingStopped,
}

/// One active phone call as reported by ACS. Read-mostly; the platform is
/// authoritative, this is kept for logging and routing decisions.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_connection_id: String,
    pub target_number: String,
    pub source_number: String,
    pub state: CallState,
}

#[derive(Default)]
struct DirectoryInner {
    calls: HashMap<String, CallSession>,
    current: Option<String>,
}

/// Directory of call sessions, plus the id of the call whose media stream
/// the next WebSocket connection belongs to.
#[derive(Clone)]
pub struct CallDirectory {
    inner: Arc<Mutex<DirectoryInner>>,
}

impl Default for CallDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl CallDirectory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DirectoryInner::default())),
        }
    }

    pub async fn insert(&self, session: CallSession) {
        let mut inner = self.inner.lock().await;
        inner.current = Some(session.call_connection_id.clone());
        inner
            .calls
            .insert(session.call_connection_id.clone(), session);
    }

    pub async fn set_state(&self, call_id: &str, state: CallState) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.calls.get_mut(call_id) {
            session.state = state;
        }
    }

    pub async fn remove(&self, call_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.calls.remove(call_id);
        if inner.current.as_deref() == Some(call_id) {
            inner.current = None;
        }
    }

    pub async fn current_call_id(&self) -> Option<String> {
        self.inner.lock().await.current.clone()
    }

    pub async fn get(&self, call_id: &str) -> Option<CallSession> {
        self.inner.lock().await.calls.get(call_id).cloned()
    }
}
