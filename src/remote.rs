//! Authoritative per-user copy of the document.
//!
//! The store is a keyed get/upsert API: one document per user id, each upsert
//! replaces the previous one wholesale (last writer wins).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::AppState;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote request failed: {0}")]
    Transport(String),
    #[error("Remote store returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Unexpected response from remote store: {0}")]
    Decode(String),
    #[error("Invalid remote store URL: {0}")]
    InvalidUrl(String),
}

pub trait RemoteStore {
    /// Current document for `user_id`, or `None` if the user has none yet
    fn fetch(&self, user_id: &str) -> Result<Option<AppState>, RemoteError>;

    /// Replace the document for `user_id`
    fn upsert(
        &self,
        user_id: &str,
        document: &AppState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct StoredRow {
    #[serde(default)]
    data: Option<AppState>,
}

#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    user_id: &'a str,
    data: &'a AppState,
    updated_at: String,
}

/// JSON-over-HTTP remote store.
///
/// `GET {base}/app_state/{user}` answers 200 with `{user_id, data, updated_at}`
/// or 404 when the user has no document; `PUT` to the same path upserts.
pub struct HttpRemoteStore {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// `{base}/app_state/{user}` with the user id encoded as one path segment
    fn document_url(&self, user_id: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("app_state")
            .push(user_id);
        Ok(url)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.api_key {
            Some(key) => request.set("Authorization", &format!("Bearer {}", key)),
            None => request,
        }
    }
}

fn map_ureq_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => RemoteError::Status {
            code,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(t) => RemoteError::Transport(t.to_string()),
    }
}

impl RemoteStore for HttpRemoteStore {
    fn fetch(&self, user_id: &str) -> Result<Option<AppState>, RemoteError> {
        let url = self.document_url(user_id)?;
        debug!(%url, "fetching remote state");
        let request = self.authorize(self.agent.get(url.as_str()));
        match request.call() {
            Ok(response) => {
                let row: StoredRow = response
                    .into_json()
                    .map_err(|e| RemoteError::Decode(e.to_string()))?;
                Ok(row.data)
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(map_ureq_error(e)),
        }
    }

    fn upsert(
        &self,
        user_id: &str,
        document: &AppState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let url = self.document_url(user_id)?;
        debug!(%url, "upserting remote state");
        let row = UpsertRow {
            user_id,
            data: document,
            updated_at: updated_at.to_rfc3339(),
        };
        self.authorize(self.agent.put(url.as_str()))
            .send_json(&row)
            .map_err(map_ureq_error)?;
        Ok(())
    }
}

/// One recorded upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRecord {
    pub user_id: String,
    pub document: AppState,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: HashMap<String, AppState>,
    upserts: Vec<UpsertRecord>,
    fetches: usize,
    fetch_error: Option<String>,
    upsert_error: Option<String>,
}

/// In-process store. Clones share the same contents, so a caller can keep a
/// handle for inspection after boxing one into a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(user_id: &str, document: AppState) -> Self {
        let store = Self::new();
        store.inner.borrow_mut().documents.insert(user_id.to_string(), document);
        store
    }

    pub fn document(&self, user_id: &str) -> Option<AppState> {
        self.inner.borrow().documents.get(user_id).cloned()
    }

    pub fn upserts(&self) -> Vec<UpsertRecord> {
        self.inner.borrow().upserts.clone()
    }

    pub fn upsert_count(&self) -> usize {
        self.inner.borrow().upserts.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.borrow().fetches
    }

    /// Make every following fetch fail with `message` (or succeed again with `None`)
    pub fn fail_fetches(&self, message: Option<&str>) {
        self.inner.borrow_mut().fetch_error = message.map(str::to_string);
    }

    /// Make every following upsert fail with `message` (or succeed again with `None`)
    pub fn fail_upserts(&self, message: Option<&str>) {
        self.inner.borrow_mut().upsert_error = message.map(str::to_string);
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn fetch(&self, user_id: &str) -> Result<Option<AppState>, RemoteError> {
        let mut inner = self.inner.borrow_mut();
        inner.fetches += 1;
        if let Some(message) = &inner.fetch_error {
            return Err(RemoteError::Transport(message.clone()));
        }
        Ok(inner.documents.get(user_id).cloned())
    }

    fn upsert(
        &self,
        user_id: &str,
        document: &AppState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(message) = &inner.upsert_error {
            return Err(RemoteError::Transport(message.clone()));
        }
        inner.documents.insert(user_id.to_string(), document.clone());
        inner.upserts.push(UpsertRecord {
            user_id: user_id.to_string(),
            document: document.clone(),
            updated_at,
        });
        Ok(())
    }
}
