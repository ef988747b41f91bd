//! Durable client-side session storage.
//!
//! A single storage key holds the serialized [`Session`]. Anything that cannot
//! be read back as a current-schema session is treated as "no session".

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;

use tillwise_auth::Session;

/// Where the session survives process restarts.
pub trait SessionStorage: Send + Sync {
    /// Load the stored session, if a usable one exists.
    fn load(&self) -> Option<Session>;

    fn save(&self, session: &Session);

    fn clear(&self);
}

/// JSON file under the OS app data directory:
/// `{app_data_dir}/tillwise/{session_key}.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default location for `session_key`.
    pub fn for_key(session_key: &str) -> anyhow::Result<Self> {
        Ok(Self::new(session_file_path(session_key)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<Option<Session>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read session file at {:?}", self.path));
            }
        };

        let session: Session = serde_json::from_str(&raw).context("failed to deserialize stored session")?;
        if !session.is_current_schema() {
            tracing::info!(
                found = session.schema_version,
                "stored session has an outdated schema; ignoring it"
            );
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn write(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create session directory at {:?}", parent))?;
        }
        let payload = serde_json::to_vec_pretty(session).context("failed to serialize session")?;

        // Write-then-rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload).with_context(|| format!("failed to write session file at {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move session file into place at {:?}", self.path))?;
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Option<Session> {
        match self.read() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("discarding unreadable stored session: {err:?}");
                None
            }
        }
    }

    fn save(&self, session: &Session) {
        if let Err(err) = self.write(session) {
            tracing::error!("failed to persist session: {err:?}");
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("failed to remove session file at {:?}: {e}", self.path),
        }
    }
}

/// In-process storage (tests, ephemeral clients).
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with raw JSON, as if written by another process.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Option<Session> {
        let raw = self.raw()?;
        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!("discarding unreadable stored session: {err}");
                return None;
            }
        };
        session.is_current_schema().then_some(session)
    }

    fn save(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(raw) => *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw),
            Err(err) => tracing::error!("failed to serialize session: {err}"),
        }
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Resolve `{app_data_dir}/tillwise/{session_key}.json`.
fn session_file_path(session_key: &str) -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("tillwise");
    path.push(format!("{session_key}.json"));
    Ok(path)
}
