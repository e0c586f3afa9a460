//! Cloud store trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use nivelver_common::{now_millis, Error, Result, User, DEFAULT_NIVEL};

/// Name of the remote collection holding user documents.
pub const USERS_COLLECTION: &str = "users";

/// A user account as stored remotely.
///
/// The document id is the username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUser {
    pub username: String,
    /// Credential digest.
    pub password: String,
    pub nivel: String,
    /// Epoch milliseconds of the last remote mutation.
    pub timestamp: i64,
}

impl From<&User> for CloudUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            password: user.password.clone(),
            nivel: user.nivel.clone(),
            timestamp: user.last_modified,
        }
    }
}

impl From<CloudUser> for User {
    fn from(remote: CloudUser) -> Self {
        Self {
            username: remote.username,
            password: remote.password,
            nivel: remote.nivel,
            last_modified: remote.timestamp,
        }
    }
}

/// Remote document store for user accounts.
///
/// Every write is a field-merge upsert keyed by username. Implementations
/// report transport failures as `RemoteUnavailable` and rejected writes as
/// `RemoteWrite`, so callers can treat every error here as advisory.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Backend name (e.g., "memory", "firestore").
    fn name(&self) -> &str;

    /// Upsert a new account, stamping it with the current time.
    async fn create_user(&self, username: &str, password_digest: &str, nivel: &str) -> Result<()> {
        self.put_user(&CloudUser {
            username: username.to_string(),
            password: password_digest.to_string(),
            nivel: nivel.to_string(),
            timestamp: now_millis(),
        })
        .await
    }

    /// Upsert a document with an explicit timestamp.
    async fn put_user(&self, user: &CloudUser) -> Result<()>;

    /// Fetch one document. Absence is `Ok(None)`.
    async fn get_user_by_username(&self, username: &str) -> Result<Option<CloudUser>>;

    /// Fetch the whole collection.
    ///
    /// Documents that fail to decode are logged and skipped.
    async fn get_all_users(&self) -> Result<Vec<CloudUser>>;

    /// Set `nivel` and stamp the current time on an existing document.
    ///
    /// # Errors
    /// - `RemoteWrite` if the document does not exist
    async fn update_user_nivel(&self, username: &str, nivel: &str) -> Result<()>;
}

/// Decode a plain field map into a user.
///
/// Missing `nivel` defaults to "A0", missing `timestamp` to 0 and missing
/// `password` to the empty string. A missing or blank `username` is a
/// `MalformedRecord`.
pub fn decode_user_document(id: &str, fields: &Map<String, Value>) -> Result<CloudUser> {
    let username = match fields.get("username") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(Value::String(_)) | None => {
            return Err(Error::MalformedRecord(format!(
                "Document '{}' has no username",
                id
            )))
        }
        Some(other) => {
            return Err(Error::MalformedRecord(format!(
                "Document '{}' has a non-string username: {}",
                id, other
            )))
        }
    };

    let text = |key: &str| -> Result<Option<String>> {
        match fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Error::MalformedRecord(format!(
                "Document '{}' field '{}' is not a string: {}",
                id, key, other
            ))),
        }
    };

    let timestamp = match fields.get("timestamp") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            Error::MalformedRecord(format!("Document '{}' timestamp out of range", id))
        })?,
        Some(Value::String(s)) => s.parse().map_err(|_| {
            Error::MalformedRecord(format!("Document '{}' timestamp is not an integer", id))
        })?,
        Some(other) => {
            return Err(Error::MalformedRecord(format!(
                "Document '{}' timestamp has unexpected type: {}",
                id, other
            )))
        }
    };

    Ok(CloudUser {
        username,
        password: text("password")?.unwrap_or_default(),
        nivel: text("nivel")?.unwrap_or_else(|| DEFAULT_NIVEL.to_string()),
        timestamp,
    })
}

/// Decode a batch of documents, skipping the ones that do not decode.
pub fn decode_user_documents<'a, I>(documents: I) -> Vec<CloudUser>
where
    I: IntoIterator<Item = (&'a str, &'a Map<String, Value>)>,
{
    documents
        .into_iter()
        .filter_map(|(id, fields)| match decode_user_document(id, fields) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Skipping remote document: {}", e);
                None
            }
        })
        .collect()
}

/// Encode a user as a plain field map.
pub fn encode_user_document(user: &CloudUser) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("username".to_string(), Value::from(user.username.clone()));
    fields.insert("password".to_string(), Value::from(user.password.clone()));
    fields.insert("nivel".to_string(), Value::from(user.nivel.clone()));
    fields.insert("timestamp".to_string(), Value::from(user.timestamp));
    fields
}
