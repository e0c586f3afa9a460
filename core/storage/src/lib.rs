//! Storage layer for nivelver.
//!
//! Two stores hold the same user accounts:
//! - [`LocalStore`]: embedded SQLite database, authoritative for every read
//!   and home of the local-only content catalog
//! - [`CloudStore`]: remote document store, best-effort and eventually
//!   reachable, resolved by name through a [`CloudRegistry`]
//!
//! Nothing here knows about reconciliation; that lives in the sync crate.

pub mod cloud;
pub mod firestore;
pub mod local;
pub mod memory;
pub mod registry;

pub use cloud::{decode_user_document, CloudStore, CloudUser, USERS_COLLECTION};
pub use firestore::{FirestoreCloudStore, FirestoreConfig};
pub use local::{LiveQuery, LocalStore, RemoteMerge, StoreStats, Table};
pub use memory::MemoryCloudStore;
pub use registry::{create_default_registry, CloudFactory, CloudRegistry};
