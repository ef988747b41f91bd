//! Record trait: identity of a server-held resource.

use crate::id::RecordId;

/// A resource the backend persists and identifies by [`RecordId`]
/// (customer, product, user, ...).
///
/// Speculative copies of a record may carry a placeholder id; the optimistic
/// list tracks them by their temporary key instead and never reads `id()` for
/// local entries.
pub trait Record: Clone + core::fmt::Debug {
    /// Returns the server-assigned identifier.
    fn id(&self) -> RecordId;
}
