//! Strongly-typed identifiers used across the client.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier assigned by the backend to a persisted record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| ValidationError::new("id", format!("RecordId: {e}")))
    }
}

/// Identifier of a record that only exists on the client so far.
///
/// Temporary ids never leave the process; the backend assigns a [`RecordId`]
/// once the create succeeds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(Uuid);

impl TempId {
    /// Uses UUIDv7 so temp ids sort by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TempId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// Reference to an entry in a client-held list: either a speculative local
/// entry or a record the server has confirmed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Local(TempId),
    Persisted(RecordId),
}

impl EntryKey {
    pub fn is_local(&self) -> bool {
        matches!(self, EntryKey::Local(_))
    }
}

impl From<RecordId> for EntryKey {
    fn from(value: RecordId) -> Self {
        EntryKey::Persisted(value)
    }
}

impl From<TempId> for EntryKey {
    fn from(value: TempId) -> Self {
        EntryKey::Local(value)
    }
}

impl core::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntryKey::Local(id) => core::fmt::Display::fmt(id, f),
            EntryKey::Persisted(id) => core::fmt::Display::fmt(id, f),
        }
    }
}
