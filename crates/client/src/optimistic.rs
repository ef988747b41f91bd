//! Optimistic list.
//!
//! A client-held collection that can show a create/update/delete before the
//! server confirms it. Every optimistic mutation hands out a
//! [`MutationTicket`]; the ticket must be settled exactly once (commit,
//! replace-id, or rollback) before the list accepts another mutation.

use tillwise_core::{EntryKey, OptimisticError, Record, RecordId, TempId};

/// One row of an [`OptimisticList`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entry<T> {
    /// Created on the client; the server has not assigned an id yet.
    Local { temp_id: TempId, item: T },
    /// Confirmed by the server.
    Persisted(T),
}

impl<T: Record> Entry<T> {
    pub fn key(&self) -> EntryKey {
        match self {
            Entry::Local { temp_id, .. } => EntryKey::Local(*temp_id),
            Entry::Persisted(item) => EntryKey::Persisted(item.id()),
        }
    }

    pub fn item(&self) -> &T {
        match self {
            Entry::Local { item, .. } | Entry::Persisted(item) => item,
        }
    }

    fn item_mut(&mut self) -> &mut T {
        match self {
            Entry::Local { item, .. } | Entry::Persisted(item) => item,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Entry::Local { .. })
    }

    fn persisted_id(&self) -> Option<RecordId> {
        match self {
            Entry::Local { .. } => None,
            Entry::Persisted(item) => Some(item.id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Update,
    Remove,
}

/// Proof that an optimistic mutation is outstanding.
///
/// Not `Clone`: settling consumes it, so a mutation cannot be settled twice.
#[must_use = "an optimistic mutation must be settled with commit, replace_id or rollback"]
#[derive(Debug, PartialEq, Eq)]
pub struct MutationTicket {
    generation: u64,
    kind: MutationKind,
    key: EntryKey,
}

impl MutationTicket {
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Key of the entry the mutation touched.
    pub fn key(&self) -> EntryKey {
        self.key
    }
}

#[derive(Debug, Clone)]
struct Pending<T> {
    generation: u64,
    snapshot: Vec<Entry<T>>,
}

/// A list with at most one outstanding optimistic mutation.
#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    entries: Vec<Entry<T>>,
    pending: Option<Pending<T>>,
    generation: u64,
}

impl<T> Default for OptimisticList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            pending: None,
            generation: 0,
        }
    }
}

impl<T: Record> OptimisticList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// List holding `items` as confirmed server state.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            entries: items.into_iter().map(Entry::Persisted).collect(),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[Entry<T>] {
        &self.entries
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(Entry::item)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: impl Into<EntryKey>) -> Option<&Entry<T>> {
        let key = key.into();
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn position(&self, key: impl Into<EntryKey>) -> Option<usize> {
        let key = key.into();
        self.entries.iter().position(|e| e.key() == key)
    }

    /// `true` while a mutation awaits settlement.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Replace the confirmed contents with a fresh server read.
    pub fn load(&mut self, items: impl IntoIterator<Item = T>) -> Result<(), OptimisticError> {
        if self.pending.is_some() {
            return Err(OptimisticError::MutationPending);
        }
        self.entries = items.into_iter().map(Entry::Persisted).collect();
        Ok(())
    }

    /// Drop everything, including an outstanding mutation.
    ///
    /// Tickets handed out before the reset become stale.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.pending = None;
        self.generation += 1;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Speculative mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Prepend `item` as a local entry.
    pub fn add_optimistic(&mut self, item: T) -> Result<(TempId, MutationTicket), OptimisticError> {
        let generation = self.begin()?;
        let temp_id = TempId::new();
        self.entries.insert(0, Entry::Local { temp_id, item });
        tracing::debug!(%temp_id, "optimistic add");
        Ok((
            temp_id,
            MutationTicket {
                generation,
                kind: MutationKind::Add,
                key: EntryKey::Local(temp_id),
            },
        ))
    }

    /// Apply `patch` to the entry under `key`.
    pub fn update_optimistic<F>(&mut self, key: impl Into<EntryKey>, patch: F) -> Result<MutationTicket, OptimisticError>
    where
        F: FnOnce(&mut T),
    {
        let key = key.into();
        let index = self.index_of(key)?;
        let generation = self.begin()?;
        patch(self.entries[index].item_mut());
        tracing::debug!(%key, "optimistic update");
        Ok(MutationTicket {
            generation,
            kind: MutationKind::Update,
            key,
        })
    }

    /// Hide the entry under `key`.
    pub fn remove_optimistic(&mut self, key: impl Into<EntryKey>) -> Result<MutationTicket, OptimisticError> {
        let key = key.into();
        let index = self.index_of(key)?;
        let generation = self.begin()?;
        self.entries.remove(index);
        tracing::debug!(%key, "optimistic remove");
        Ok(MutationTicket {
            generation,
            kind: MutationKind::Remove,
            key,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────

    /// Accept the speculative state as is.
    pub fn commit(&mut self, ticket: MutationTicket) -> Result<(), OptimisticError> {
        self.settle(&ticket)?;
        tracing::debug!(key = %ticket.key, kind = ?ticket.kind, "optimistic mutation committed");
        Ok(())
    }

    /// Accept the mutation with the server's authoritative record.
    ///
    /// For creates this is [`OptimisticList::replace_id`]; for updates the
    /// touched entry is overwritten; for removes the record is ignored.
    pub fn commit_with(&mut self, ticket: MutationTicket, server_item: T) -> Result<(), OptimisticError> {
        self.settle(&ticket)?;
        match ticket.kind {
            MutationKind::Add => self.swap_in(ticket.key, server_item),
            MutationKind::Update => match self.entries.iter().position(|e| e.key() == ticket.key) {
                Some(index) => self.entries[index] = Entry::Persisted(server_item),
                None => tracing::warn!(key = %ticket.key, "updated entry vanished before commit"),
            },
            MutationKind::Remove => {}
        }
        Ok(())
    }

    /// Swap the local entry created by `ticket` for the server's record.
    ///
    /// Any other copy of the same server id (e.g. from a refetch) is dropped
    /// first, then the record takes the local entry's slot, so it appears
    /// once and keeps the local entry's place among the other rows.
    pub fn replace_id(&mut self, ticket: MutationTicket, server_item: T) -> Result<(), OptimisticError> {
        self.commit_with(ticket, server_item)
    }

    /// Restore the list exactly as it was before the mutation.
    pub fn rollback(&mut self, ticket: MutationTicket) -> Result<(), OptimisticError> {
        let pending = self.settle(&ticket)?;
        self.entries = pending.snapshot;
        tracing::warn!(key = %ticket.key, kind = ?ticket.kind, "optimistic mutation rolled back");
        Ok(())
    }

    fn begin(&mut self) -> Result<u64, OptimisticError> {
        if self.pending.is_some() {
            return Err(OptimisticError::MutationPending);
        }
        self.generation += 1;
        self.pending = Some(Pending {
            generation: self.generation,
            snapshot: self.entries.clone(),
        });
        Ok(self.generation)
    }

    fn settle(&mut self, ticket: &MutationTicket) -> Result<Pending<T>, OptimisticError> {
        match self.pending.take() {
            Some(pending) if pending.generation == ticket.generation => Ok(pending),
            other => {
                self.pending = other;
                Err(OptimisticError::StaleTicket)
            }
        }
    }

    fn index_of(&self, key: EntryKey) -> Result<usize, OptimisticError> {
        self.entries
            .iter()
            .position(|e| e.key() == key)
            .ok_or_else(|| OptimisticError::UnknownEntry(key.to_string()))
    }

    fn swap_in(&mut self, key: EntryKey, server_item: T) {
        let server_id = server_item.id();
        self.entries.retain(|e| e.persisted_id() != Some(server_id));
        match self.entries.iter().position(|e| e.key() == key) {
            Some(index) => self.entries[index] = Entry::Persisted(server_item),
            None => {
                tracing::warn!(%key, "local entry vanished before replace; prepending server record");
                self.entries.insert(0, Entry::Persisted(server_item));
            }
        }
    }
}
