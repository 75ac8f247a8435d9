//! Persisted chat history: a per-user session log plus an archive of past
//! chats.
//!
//! Layout matches the original desktop build: a JSON transcript at
//! `~/.ollama_chat_history/{username}_chat_history.json` and archived chats
//! under `archive/chat_{timestamp}.json`. Every write goes through a
//! temp-file-then-rename so a crash mid-write never clobbers the last good
//! version.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::conversation_state::Message;
use super::error::PersistenceError;

const HISTORY_DIR_NAME: &str = ".ollama_chat_history";
const ARCHIVE_DIR_NAME: &str = "archive";
/// How many archived chats the picker lists.
pub const RECENT_ARCHIVES: usize = 5;

/// Black-box persistence operations the orchestrator needs.
pub trait HistoryStore {
    fn load(&self) -> Result<Vec<Message>, PersistenceError>;
    fn persist(&self, messages: &[Message]) -> Result<(), PersistenceError>;

    /// Save the current transcript as a timestamped archive; returns the
    /// archive name, or `None` when the transcript is empty.
    fn archive(&self, messages: &[Message]) -> Result<Option<String>, PersistenceError>;

    /// Names of the most recent archives, newest first.
    fn list_archives(&self) -> Result<Vec<String>, PersistenceError>;
    fn load_archive(&self, name: &str) -> Result<Vec<Message>, PersistenceError>;
    fn rename_archive(&self, name: &str, new_name: &str) -> Result<(), PersistenceError>;
    fn delete_archive(&self, name: &str) -> Result<(), PersistenceError>;
}

/// File-backed store under the user's home directory.
pub struct FileHistoryStore {
    history_file: PathBuf,
    archive_dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new() -> Result<Self, PersistenceError> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_root(home.join(HISTORY_DIR_NAME))
    }

    /// Build a store rooted at an explicit directory.
    pub fn with_root(root: PathBuf) -> Result<Self, PersistenceError> {
        let username = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string());

        let archive_dir = root.join(ARCHIVE_DIR_NAME);
        fs::create_dir_all(&archive_dir)?;

        Ok(Self {
            history_file: root.join(format!("{username}_chat_history.json")),
            archive_dir,
        })
    }

    fn write_atomic(path: &Path, messages: &[Message]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(messages)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn archive_path(&self, name: &str) -> Result<PathBuf, PersistenceError> {
        let path = self.archive_dir.join(format!("{name}.json"));
        if path.is_file() {
            Ok(path)
        } else {
            Err(PersistenceError::NoSuchArchive(name.to_string()))
        }
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> Result<Vec<Message>, PersistenceError> {
        if !self.history_file.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.history_file)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn persist(&self, messages: &[Message]) -> Result<(), PersistenceError> {
        Self::write_atomic(&self.history_file, messages)
    }

    fn archive(&self, messages: &[Message]) -> Result<Option<String>, PersistenceError> {
        if messages.is_empty() {
            return Ok(None);
        }
        let name = format!("chat_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        Self::write_atomic(&self.archive_dir.join(format!("{name}.json")), messages)?;
        Ok(Some(name))
    }

    fn list_archives(&self) -> Result<Vec<String>, PersistenceError> {
        let mut names: Vec<String> = fs::read_dir(&self.archive_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort_by(|a, b| b.cmp(a));
        names.truncate(RECENT_ARCHIVES);
        Ok(names)
    }

    fn load_archive(&self, name: &str) -> Result<Vec<Message>, PersistenceError> {
        let json = fs::read_to_string(self.archive_path(name)?)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn rename_archive(&self, name: &str, new_name: &str) -> Result<(), PersistenceError> {
        let from = self.archive_path(name)?;
        let to = self.archive_dir.join(format!("{new_name}.json"));
        fs::rename(from, to)?;
        Ok(())
    }

    fn delete_archive(&self, name: &str) -> Result<(), PersistenceError> {
        fs::remove_file(self.archive_path(name)?)?;
        Ok(())
    }
}
