//! In-memory cloud store for testing.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use nivelver_common::{now_millis, Error, Result};

use crate::cloud::{decode_user_document, decode_user_documents, encode_user_document, CloudStore, CloudUser};

type Documents = BTreeMap<String, Map<String, Value>>;

/// In-memory document store.
///
/// Useful for testing and development. Documents are kept as plain field
/// maps and lost on drop. Failures can be injected: the whole store can be
/// taken offline, and writes for individual usernames can be made to fail.
#[derive(Default)]
pub struct MemoryCloudStore {
    documents: RwLock<Documents>,
    offline: AtomicBool,
    failing_writes: RwLock<HashSet<String>>,
    write_attempts: AtomicUsize,
    read_attempts: AtomicUsize,
}

impl MemoryCloudStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `RemoteUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make writes for `username` fail with `RemoteWrite`.
    pub fn fail_writes_for(&self, username: &str) -> Result<()> {
        self.failing()?.insert(username.to_string());
        Ok(())
    }

    /// Store a raw document, bypassing validation.
    pub fn insert_document(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.write_documents()?.insert(id.to_string(), fields);
        Ok(())
    }

    /// Raw fields of a stored document.
    pub fn document(&self, id: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.read_documents()?.get(id).cloned())
    }

    /// Number of stored documents.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_documents()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Write operations attempted so far, including failed ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Read operations attempted so far, including failed ones.
    pub fn read_attempts(&self) -> usize {
        self.read_attempts.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("Memory store is offline".to_string()));
        }
        Ok(())
    }

    fn begin_write(&self, username: &str) -> Result<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let failing = self
            .failing_writes
            .read()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;
        if failing.contains(username) {
            return Err(Error::RemoteWrite(format!(
                "Injected write failure for '{}'",
                username
            )));
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<()> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    fn read_documents(&self) -> Result<RwLockReadGuard<'_, Documents>> {
        self.documents
            .read()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    fn write_documents(&self) -> Result<RwLockWriteGuard<'_, Documents>> {
        self.documents
            .write()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    fn failing(&self) -> Result<RwLockWriteGuard<'_, HashSet<String>>> {
        self.failing_writes
            .write()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_user(&self, user: &CloudUser) -> Result<()> {
        self.begin_write(&user.username)?;

        let mut documents = self.write_documents()?;
        documents
            .entry(user.username.clone())
            .or_default()
            .extend(encode_user_document(user));

        debug!("Memory store upserted: {}", user.username);
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<CloudUser>> {
        self.begin_read()?;
        let documents = self.read_documents()?;
        documents
            .get(username)
            .map(|fields| decode_user_document(username, fields))
            .transpose()
    }

    async fn get_all_users(&self) -> Result<Vec<CloudUser>> {
        self.begin_read()?;
        let documents = self.read_documents()?;
        Ok(decode_user_documents(
            documents.iter().map(|(id, fields)| (id.as_str(), fields)),
        ))
    }

    async fn update_user_nivel(&self, username: &str, nivel: &str) -> Result<()> {
        self.begin_write(username)?;

        let mut documents = self.write_documents()?;
        let fields = documents.get_mut(username).ok_or_else(|| {
            Error::RemoteWrite(format!("No document to update: {}", username))
        })?;
        fields.insert("nivel".to_string(), Value::from(nivel));
        fields.insert("timestamp".to_string(), Value::from(now_millis()));

        debug!("Memory store nivel updated: {} -> {}", username, nivel);
        Ok(())
    }
}
