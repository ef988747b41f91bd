//! `tillwise-client`
//!
//! **Responsibility:** runtime layer of the Tillwise back-office client.
//!
//! This crate provides:
//! - An HTTP client over the REST API (envelope unwrapping, timeouts,
//!   single-flight token refresh)
//! - The session store (login/logout, persistence, proactive refresh)
//! - Optimistic lists and query caches with exact rollback
//! - Domain mutation hooks with user notifications
//!
//! The backend stays the authority; everything held here is a cache or a
//! speculative view of it.

pub mod config;
pub mod debounce;
pub mod hooks;
pub mod http;
pub mod notify;
pub mod optimistic;
pub mod query_cache;
pub mod session_store;
pub mod storage;
pub mod types;

pub use config::ClientConfig;
pub use debounce::Debouncer;
pub use hooks::{InventoryHooks, Resource, ResourceHooks};
pub use http::{ApiClient, ApiRequest, SessionListener, TokenHandle};
pub use notify::{Level, MemoryNotifier, Notification, Notifier, TracingNotifier};
pub use optimistic::{Entry, MutationKind, MutationTicket, OptimisticList};
pub use query_cache::{CacheSnapshot, CachedPage, QueryCache, QueryKey};
pub use session_store::{AuthState, Credentials, SessionStore};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
