//! Firestore cloud store.
//!
//! Talks to the Firestore REST API directly: one collection of user
//! documents keyed by username.

mod client;
mod document;

pub use client::{create_firestore_store, FirestoreCloudStore, FirestoreConfig, FIRESTORE_API_BASE};
