//! Domain mutation hooks.
//!
//! Each hook composes a permission re-check, client-side validation, an
//! optimistic change, the network call and the user notification for one
//! kind of mutation.

pub mod inventory;
pub mod resource;

pub use inventory::{InventoryHooks, StockChange};
pub use resource::{Endpoint, Resource, ResourceHooks, resources};
