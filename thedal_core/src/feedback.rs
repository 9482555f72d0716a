//! Append-only feedback log.
//!
//! Events are created once on submission and never mutated. The store
//! keeps an in-memory log and, when configured with a path, mirrors each
//! event to a JSONL file for offline analysis. No update or delete is
//! exposed.

use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::EngineError;
use crate::types::{FeedbackEvent, FeedbackReceipt};

pub struct FeedbackStore {
    events: Mutex<Vec<FeedbackEvent>>,
    path: Option<PathBuf>,
}

impl FeedbackStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            path,
        }
    }

    /// Validate and append one event, assigning its id and timestamp.
    ///
    /// A well-formed `candidate_id` is accepted even if it references no
    /// known result; late and replayed feedback is still useful offline.
    pub fn record(&self, mut event: FeedbackEvent) -> Result<FeedbackReceipt, EngineError> {
        event.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        event.id = Some(id.clone());
        event.created_at = Some(created_at);

        if let Some(path) = &self.path {
            if let Err(err) = self.append_to_file(path, &event) {
                // The in-memory log still gets the event; file mirroring
                // is best effort.
                warn!(path = %path.display(), error = %err, "feedback file append failed");
            }
        }

        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        events.push(event);

        Ok(FeedbackReceipt { id, created_at })
    }

    fn append_to_file(&self, path: &Path, event: &FeedbackEvent) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read-only view for offline reporting and tests.
    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
