//! `tillwise-core`: shared client primitives.
//!
//! This crate contains the pieces every other Tillwise crate agrees on: record
//! identifiers, the backend response envelope, and the client error taxonomy.
//! No IO happens here.

pub mod envelope;
pub mod error;
pub mod id;
pub mod record;
pub mod validate;

pub use envelope::{Envelope, ErrorBody, Paginated, Pagination};
pub use error::{ApiError, ApiErrorKind, ClientError, ClientResult, OptimisticError, ValidationError};
pub use id::{EntryKey, RecordId, TempId};
pub use record::Record;
pub use validate::Validate;
