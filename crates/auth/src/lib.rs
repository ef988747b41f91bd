//! `tillwise-auth`: pure session and permission model.
//!
//! This crate is intentionally decoupled from HTTP and storage: it answers
//! "who is signed in, until when, and may they do this?".

pub mod claims;
pub mod permissions;
pub mod resolver;
pub mod session;

pub use claims::{Claims, ClaimsError, decode_claims};
pub use permissions::{Permission, PermissionSet};
pub use resolver::{
    AuthzError, Explanation, PermissionFallbackPolicy, PermissionRequirement, PermissionState, authorize,
    explain, has_permission, resolve, visible,
};
pub use session::{SESSION_SCHEMA_VERSION, Session, SessionUser, TokenSet, refresh_delay};
