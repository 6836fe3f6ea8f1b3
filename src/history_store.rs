use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::session::ConversationTurn;

fn is_safe_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.len() > 255 {
        return false;
    }

    let pattern = Regex::new(r"^[\w\-_\u0020-\u007E\u00A0-\uFFFF]+$").unwrap();
    pattern.is_match(filename)
}

fn sanitize_session_id(session_id: &str) -> Result<String> {
    let sanitized = Path::new(session_id)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid session id: {}", session_id))?
        .to_string();

    if !is_safe_filename(&sanitized) {
        return Err(anyhow::anyhow!("Invalid characters in session id: {}", session_id));
    }

    Ok(sanitized)
}

/// File-backed conversation store, one JSON file per session id. The
/// orchestrator reads it on connect and appends after each completed
/// response cycle; the REST surface reads and deletes it.
pub struct HistoryStore {
    base_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        let safe_id = sanitize_session_id(session_id)?;
        let full_path = self.base_dir.join(format!("{}.json", safe_id));

        // Ensure path is within base_dir (prevent path traversal)
        if !full_path.starts_with(&self.base_dir) {
            return Err(anyhow::anyhow!("Invalid path: Path traversal detected"));
        }

        Ok(full_path)
    }

    /// Create an empty history for a new session id.
    pub fn create(&self, session_id: &str) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let filepath = self.session_path(session_id)?;
        fs::write(&filepath, serde_json::to_string_pretty(&Vec::<ConversationTurn>::new())?)?;
        debug!("Created history file: {:?}", filepath);
        Ok(())
    }

    /// Load the stored turns, or `None` when the session has no history yet.
    pub fn load(&self, session_id: &str) -> Result<Option<Vec<ConversationTurn>>> {
        let filepath = self.session_path(session_id)?;
        if !filepath.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&filepath)?;
        let turns: Vec<ConversationTurn> = serde_json::from_str(&content)?;
        Ok(Some(turns))
    }

    /// Append turns via read-modify-write, creating the file if needed.
    pub fn append(&self, session_id: &str, turns: &[ConversationTurn]) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let filepath = self.session_path(session_id)?;

        let mut stored: Vec<ConversationTurn> = if filepath.exists() {
            let content = fs::read_to_string(&filepath)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };

        stored.extend_from_slice(turns);
        fs::write(&filepath, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    /// Empty a session's history without removing the session itself.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let filepath = self.session_path(session_id)?;
        if filepath.exists() {
            fs::write(&filepath, serde_json::to_string_pretty(&Vec::<ConversationTurn>::new())?)?;
            debug!("Cleared history file: {:?}", filepath);
        }
        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        let filepath = self.session_path(session_id)?;
        if filepath.exists() {
            fs::remove_file(&filepath)?;
            debug!("Deleted history file: {:?}", filepath);
        }
        Ok(())
    }
}
