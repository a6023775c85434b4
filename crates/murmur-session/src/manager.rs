//! Cross-call session table.
//!
//! The only resource shared across calls. All mutation happens under one
//! mutex so registration and counter updates stay atomic with respect to
//! concurrently running per-call tasks. Outbound delivery writes serialized
//! frames into each session's transport channel; the mutex is never held
//! across an await.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use murmur_core::events::DomainEvent;
use murmur_core::types::SessionId;

use crate::protocol::ServerMessage;

/// Per-session delivery and ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub messages: u64,
    pub audio_chunks: u64,
    pub transcripts_sent: u64,
    pub suggestions_sent: u64,
}

/// Serializable view of one session's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(flatten)]
    pub counters: SessionCounters,
    pub metadata: Value,
    pub degraded: bool,
}

/// Snapshot of the whole session table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSnapshot>,
}

struct SessionEntry {
    opened_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    counters: SessionCounters,
    metadata: serde_json::Map<String, Value>,
    outbound: mpsc::UnboundedSender<String>,
    degraded: bool,
}

impl SessionEntry {
    fn snapshot(&self, id: SessionId) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id,
            opened_at: self.opened_at,
            last_activity: self.last_activity,
            counters: self.counters,
            metadata: Value::Object(self.metadata.clone()),
            degraded: self.degraded,
        }
    }
}

type Listener = Box<dyn Fn(SessionId) + Send + Sync>;

/// Registers and routes all live call sessions.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    connect_listeners: Mutex<Vec<Listener>>,
    disconnect_listeners: Mutex<Vec<Listener>>,
    events: broadcast::Sender<DomainEvent>,
}

impl SessionManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sessions: Mutex::new(HashMap::new()),
            connect_listeners: Mutex::new(Vec::new()),
            disconnect_listeners: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to domain events (session lifecycle, deliveries).
    pub fn subscribe_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Publish a domain event on behalf of a per-call task.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.events.send(event);
    }

    /// Register a callback fired when a session opens.
    pub fn on_connect(&self, listener: impl Fn(SessionId) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.connect_listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Register a callback fired when a session closes.
    pub fn on_disconnect(&self, listener: impl Fn(SessionId) + Send + Sync + 'static) {
        if let Ok(mut listeners) = self.disconnect_listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Register a new call session around its outbound transport.
    pub fn open(
        &self,
        outbound: mpsc::UnboundedSender<String>,
        metadata: Option<serde_json::Map<String, Value>>,
    ) -> SessionId {
        let id = SessionId::new();
        let now = Utc::now();

        let entry = SessionEntry {
            opened_at: now,
            last_activity: now,
            counters: SessionCounters::default(),
            metadata: metadata.unwrap_or_default(),
            outbound,
            degraded: false,
        };

        let total = match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.insert(id, entry);
                sessions.len()
            }
            Err(e) => {
                error!(error = %e, "Session table lock poisoned during open");
                0
            }
        };

        info!(session_id = %id, total_sessions = total, "Session opened");
        self.publish(DomainEvent::SessionOpened { session_id: id });

        if let Ok(listeners) = self.connect_listeners.lock() {
            for listener in listeners.iter() {
                listener(id);
            }
        }

        id
    }

    /// Deregister a session. A second close for the same id is a no-op.
    pub fn close(&self, session_id: SessionId) {
        let removed = match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(&session_id),
            Err(e) => {
                error!(error = %e, "Session table lock poisoned during close");
                None
            }
        };

        let Some(entry) = removed else {
            return;
        };

        info!(
            session_id = %session_id,
            messages = entry.counters.messages,
            audio_chunks = entry.counters.audio_chunks,
            transcripts = entry.counters.transcripts_sent,
            suggestions = entry.counters.suggestions_sent,
            "Session closed"
        );

        self.publish(DomainEvent::SessionClosed {
            session_id,
            messages: entry.counters.messages,
            audio_chunks: entry.counters.audio_chunks,
            transcripts_sent: entry.counters.transcripts_sent,
            suggestions_sent: entry.counters.suggestions_sent,
        });

        if let Ok(listeners) = self.disconnect_listeners.lock() {
            for listener in listeners.iter() {
                listener(session_id);
            }
        }
    }

    /// Serialize an outbound event to the session's transport.
    ///
    /// Returns false for unknown sessions and transport failures. A failed
    /// send marks the session degraded but never panics or propagates;
    /// per-call loops must survive delivery failure.
    pub fn deliver(&self, session_id: SessionId, message: &ServerMessage) -> bool {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to serialize frame");
                return false;
            }
        };

        let Ok(mut sessions) = self.sessions.lock() else {
            error!("Session table lock poisoned during deliver");
            return false;
        };
        let Some(entry) = sessions.get_mut(&session_id) else {
            warn!(session_id = %session_id, "Delivery to unknown session");
            return false;
        };

        if entry.outbound.send(frame).is_err() {
            entry.degraded = true;
            drop(sessions);
            warn!(session_id = %session_id, "Transport send failed; session degraded");
            self.publish(DomainEvent::DeliveryFailed { session_id });
            return false;
        }

        entry.counters.messages += 1;
        entry.last_activity = Utc::now();

        match message {
            ServerMessage::Transcript {
                speaker_id,
                speaker_role,
                is_final,
                ..
            } => {
                entry.counters.transcripts_sent += 1;
                let event = DomainEvent::TranscriptDelivered {
                    session_id,
                    speaker_id: *speaker_id,
                    speaker_role: *speaker_role,
                    is_final: *is_final,
                };
                drop(sessions);
                self.publish(event);
            }
            ServerMessage::Suggestion {
                question_type,
                confidence,
                ..
            } => {
                entry.counters.suggestions_sent += 1;
                let event = DomainEvent::SuggestionDelivered {
                    session_id,
                    kind: *question_type,
                    confidence: *confidence,
                };
                drop(sessions);
                self.publish(event);
            }
            _ => {}
        }

        true
    }

    /// Deliver a message to every live session; returns the success count.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let ids: Vec<SessionId> = match self.sessions.lock() {
            Ok(sessions) => sessions.keys().copied().collect(),
            Err(_) => return 0,
        };
        ids.into_iter()
            .filter(|id| self.deliver(*id, message))
            .count()
    }

    /// Count one received audio chunk for a session.
    pub fn record_audio(&self, session_id: SessionId) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(entry) = sessions.get_mut(&session_id) {
                entry.counters.audio_chunks += 1;
                entry.last_activity = Utc::now();
            }
        }
    }

    /// Merge a metadata patch into a session. Returns false if unknown.
    pub fn update_metadata(&self, session_id: SessionId, patch: Value) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        let Some(entry) = sessions.get_mut(&session_id) else {
            return false;
        };
        if let Value::Object(patch) = patch {
            for (key, value) in patch {
                entry.metadata.insert(key, value);
            }
        }
        true
    }

    /// Snapshot one session.
    pub fn snapshot(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        self.sessions
            .lock()
            .ok()?
            .get(&session_id)
            .map(|entry| entry.snapshot(session_id))
    }

    /// Snapshot all sessions' counters for observability.
    pub fn status(&self) -> ManagerStatus {
        let sessions = match self.sessions.lock() {
            Ok(sessions) => sessions
                .iter()
                .map(|(id, entry)| entry.snapshot(*id))
                .collect(),
            Err(_) => Vec::new(),
        };
        ManagerStatus {
            active_sessions: self.session_count(),
            sessions,
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Close every live session (server shutdown).
    pub fn close_all(&self) {
        let ids: Vec<SessionId> = match self.sessions.lock() {
            Ok(sessions) => sessions.keys().copied().collect(),
            Err(_) => return,
        };
        info!(count = ids.len(), "Closing all sessions");
        for id in ids {
            self.close(id);
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
