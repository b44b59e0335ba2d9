//! Per-sender conversation sessions
//!
//! The store exclusively owns all session data; the engine only works on
//! clones handed out for the duration of one message and writes back
//! through [`SessionStore::update`]. Sessions are created lazily: `get`
//! for an unknown sender returns a default without persisting it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Position of a sender in the report-collection flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConversationState {
    /// No report in progress; next text is a greeting or a description
    #[default]
    Initial,
    /// Description accepted, waiting for coordinates
    WaitingLocation,
    /// Coordinates stored, waiting for a photo
    WaitingPhoto,
    /// Reserved; the photo transition submits directly instead of
    /// passing through here
    ReadyToSubmit,
}

/// Accumulated report fields for one sender
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Current state of the conversation
    pub state: ConversationState,
    /// Report description, set once the classifier accepts it
    pub description: Option<String>,
    /// Report latitude, set once a location message arrives
    pub latitude: Option<f64>,
    /// Report longitude, set once a location message arrives
    pub longitude: Option<f64>,
}

/// In-memory session store keyed by sender identity
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for `sender`, or a fresh default.
    ///
    /// The default is not persisted until the first [`update`](Self::update).
    #[must_use]
    pub fn get(&self, sender: &str) -> Session {
        self.lock().get(sender).cloned().unwrap_or_default()
    }

    /// Merge changes into `sender`'s session (creating it if absent) and
    /// return the merged result.
    pub fn update(&self, sender: &str, apply: impl FnOnce(&mut Session)) -> Session {
        let mut sessions = self.lock();
        let session = sessions.entry(sender.to_string()).or_default();
        apply(session);
        session.clone()
    }

    /// Remove `sender`'s session entirely
    pub fn delete(&self, sender: &str) {
        self.lock().remove(sender);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unknown_sender_returns_default_without_persisting() {
        let store = SessionStore::new();

        let session = store.get("591700");
        assert_eq!(session.state, ConversationState::Initial);
        assert!(session.description.is_none());

        // A mutation through another sender must not have materialized it
        store.update("other", |s| s.state = ConversationState::WaitingPhoto);
        assert_eq!(store.get("591700"), Session::default());
    }

    #[test]
    fn test_update_merges_fields() {
        let store = SessionStore::new();

        store.update("591700", |s| {
            s.state = ConversationState::WaitingLocation;
            s.description = Some("bache en la avenida".to_string());
        });
        let merged = store.update("591700", |s| {
            s.state = ConversationState::WaitingPhoto;
            s.latitude = Some(-17.39);
            s.longitude = Some(-66.15);
        });

        assert_eq!(merged.state, ConversationState::WaitingPhoto);
        assert_eq!(merged.description.as_deref(), Some("bache en la avenida"));
        assert_eq!(merged.latitude, Some(-17.39));
    }

    #[test]
    fn test_delete_clears_all_fields() {
        let store = SessionStore::new();

        store.update("591700", |s| {
            s.state = ConversationState::WaitingPhoto;
            s.description = Some("bache".to_string());
        });
        store.delete("591700");

        assert_eq!(store.get("591700"), Session::default());
    }
}
