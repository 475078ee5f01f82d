//! # warden-types: Core types for `Warden`
//!
//! Shared data model for the authorization engine:
//! - Entity identity ([`EntityType`], [`EntityUid`])
//! - Runtime values ([`Value`])
//! - Entities and the loaded entity graph ([`Entity`], [`EntityStore`])
//!
//! The store is immutable once built. Hierarchy checks (`in`) go through
//! [`EntityStore::is_ancestor`], which is reflexive, transitive, and safe on
//! cyclic parent graphs.
//!
//! ```
//! use warden_types::{Entity, EntityStore, EntityUid};
//!
//! let alice = EntityUid::new("User", "alice");
//! let admins = EntityUid::new("Group", "admins");
//!
//! let store = EntityStore::load([
//!     Entity::new(alice.clone()).with_parent(admins.clone()),
//!     Entity::new(admins.clone()),
//! ])?;
//!
//! assert!(store.is_ancestor(&admins, &alice));
//! # Ok::<(), warden_types::StoreError>(())
//! ```

mod entity;
mod store;
mod uid;
mod value;

pub use entity::Entity;
pub use store::{EntityStore, StoreError};
pub use uid::{EntityType, EntityUid};
pub use value::Value;
