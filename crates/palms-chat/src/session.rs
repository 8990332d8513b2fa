use palms_types::{ChatHistory, ChatMessage, FileInfo, SessionId, DEFAULT_MODEL};

use crate::store::{LocalStore, StoreError};

const SESSION_KEY: &str = "session_id";
const MODEL_KEY: &str = "selected_model";

fn history_key(session: &SessionId) -> String {
    format!("history_{}", session)
}

fn files_key(session: &SessionId) -> String {
    format!("files_{}", session)
}

/// Everything the client remembers between runs: the session id, its chat
/// history, the uploaded files and the selected model.
///
/// Every mutation is written through to the [`LocalStore`] before returning.
#[derive(Debug)]
pub struct SessionState {
    store: LocalStore,
    session_id: SessionId,
    history: ChatHistory,
    model: String,
    files: Vec<FileInfo>,
}

impl SessionState {
    /// Resume the stored session, or start one and persist its id at once
    pub fn open(store: LocalStore) -> Result<Self, StoreError> {
        Self::open_with_default_model(store, DEFAULT_MODEL)
    }

    /// Like [`open`](Self::open), with `default_model` used until a model is
    /// selected
    pub fn open_with_default_model(store: LocalStore, default_model: &str) -> Result<Self, StoreError> {
        let session_id = match store.get::<SessionId>(SESSION_KEY)? {
            Some(id) if !id.as_str().is_empty() => {
                log::debug!("resuming session {}", id);
                id
            }
            _ => {
                let id = SessionId::generate();
                store.set(SESSION_KEY, &id)?;
                log::debug!("started session {}", id);
                id
            }
        };

        let history = store.get(&history_key(&session_id))?.unwrap_or_default();
        let files = store.get(&files_key(&session_id))?.unwrap_or_default();
        let model = store
            .get::<String>(MODEL_KEY)?
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());

        Ok(Self {
            store,
            session_id,
            history,
            model,
            files,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Add a message and persist the whole history. If the write fails the
    /// in-memory history is left as it was.
    pub fn append(&mut self, message: ChatMessage) -> Result<(), StoreError> {
        let mut history = self.history.clone();
        history.push(message);
        self.save_history(history)
    }

    pub fn clear_history(&mut self) -> Result<(), StoreError> {
        self.save_history(ChatHistory::default())
    }

    /// Switch to a fresh session with empty history and no files. The old
    /// session's documents are removed.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.store.remove(&history_key(&self.session_id))?;
        self.store.remove(&files_key(&self.session_id))?;

        let id = SessionId::generate();
        self.store.set(SESSION_KEY, &id)?;
        log::debug!("session {} replaced by {}", self.session_id, id);

        self.session_id = id;
        self.history.clear();
        self.files.clear();
        Ok(())
    }

    pub fn set_model(&mut self, model: impl Into<String>) -> Result<(), StoreError> {
        let model = model.into();
        self.store.set(MODEL_KEY, &model)?;
        self.model = model;
        Ok(())
    }

    pub fn set_files(&mut self, files: Vec<FileInfo>) -> Result<(), StoreError> {
        self.store.set(&files_key(&self.session_id), &files)?;
        self.files = files;
        Ok(())
    }

    fn save_history(&mut self, history: ChatHistory) -> Result<(), StoreError> {
        self.store.set(&history_key(&self.session_id), &history)?;
        self.history = history;
        Ok(())
    }
}
