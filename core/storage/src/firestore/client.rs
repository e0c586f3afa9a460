//! Firestore REST client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use nivelver_common::{now_millis, Error, Result};

use crate::cloud::{decode_user_document, decode_user_documents, CloudStore, CloudUser, USERS_COLLECTION};

use super::document::{nivel_body, user_body, FirestoreDocument, ListDocumentsResponse, USER_FIELDS};

/// Firestore REST API base URL.
pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";

/// Documents fetched per listing page.
const PAGE_SIZE: &str = "300";

fn default_database() -> String {
    "(default)".to_string()
}

fn default_base_url() -> String {
    FIRESTORE_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Firestore cloud store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    pub project_id: String,
    /// Database id within the project.
    #[serde(default = "default_database")]
    pub database: String,
    /// Web API key, sent as the `key` query parameter.
    #[serde(default)]
    pub api_key: Option<String>,
    /// OAuth2 or Firebase ID token, sent as a bearer token.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// API endpoint; override for the emulator.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Transport timeout per request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FirestoreConfig {
    /// Configuration for a project with default settings.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: default_database(),
            api_key: None,
            bearer_token: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(Error::InvalidInput("Firestore project_id is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(Error::InvalidInput("Firestore database is required".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidInput("Firestore timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// URL of the users collection.
    pub fn collection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid Firestore base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput("Firestore base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "projects",
                self.project_id.as_str(),
                "databases",
                self.database.as_str(),
                "documents",
                USERS_COLLECTION,
            ]);
        Ok(url)
    }
}

/// Cloud store backed by the Firestore REST API.
///
/// Writes are PATCH requests with an explicit `updateMask`, which gives
/// field-merge semantics: fields not named in the mask are left untouched.
pub struct FirestoreCloudStore {
    config: FirestoreConfig,
    http: Client,
    collection: Url,
}

impl FirestoreCloudStore {
    /// Create a new Firestore client.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client construction failure
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        config.validate()?;
        let collection = config.collection_url()?;
        let http = Client::builder()
            .user_agent("Nivelver/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            collection,
        })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, username: &str) -> Result<Url> {
        let mut url = self.collection.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal("Collection URL cannot be a base".to_string()))?
            .push(username);
        Ok(url)
    }

    /// Attach credentials to a request.
    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to {}: {}", action, e)))
    }

    /// PATCH a document with the given field mask.
    async fn patch(
        &self,
        username: &str,
        mask: &[&str],
        must_exist: bool,
        body: serde_json::Value,
    ) -> Result<()> {
        let url = self.document_url(username)?;
        let mut params: Vec<(&str, &str)> =
            mask.iter().map(|field| ("updateMask.fieldPaths", *field)).collect();
        if must_exist {
            params.push(("currentDocument.exists", "true"));
        }

        let request = self.http.patch(url).query(&params).json(&body);
        let response = self.send(request, "write document").await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && must_exist {
            return Err(Error::RemoteWrite(format!(
                "No document to update: {}",
                username
            )));
        }
        Err(Error::RemoteWrite(format!(
            "Write of '{}' rejected: {} - {}",
            username, status, detail
        )))
    }

    async fn read_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::MalformedRecord(format!("Failed to parse response: {}", e)))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::RemoteUnavailable(format!("API error: {} - {}", status, body)))
        }
    }
}

#[async_trait]
impl CloudStore for FirestoreCloudStore {
    fn name(&self) -> &str {
        "firestore"
    }

    async fn put_user(&self, user: &CloudUser) -> Result<()> {
        self.patch(&user.username, &USER_FIELDS, false, user_body(user))
            .await?;
        debug!("Firestore upserted: {}", user.username);
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<CloudUser>> {
        let url = self.document_url(username)?;
        let response = self.send(self.http.get(url), "get document").await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Firestore user not found: {}", username);
            return Ok(None);
        }

        let document: FirestoreDocument = Self::read_response(response).await?;
        decode_user_document(document.id(), &document.plain_fields()).map(Some)
    }

    async fn get_all_users(&self) -> Result<Vec<CloudUser>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.collection.clone())
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.send(request, "list documents").await?;
            let page: ListDocumentsResponse = Self::read_response(response).await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Firestore listed {} documents", documents.len());
        let decoded: Vec<_> = documents
            .iter()
            .map(|doc| (doc.id().to_string(), doc.plain_fields()))
            .collect();
        Ok(decode_user_documents(
            decoded.iter().map(|(id, fields)| (id.as_str(), fields)),
        ))
    }

    async fn update_user_nivel(&self, username: &str, nivel: &str) -> Result<()> {
        self.patch(
            username,
            &["nivel", "timestamp"],
            true,
            nivel_body(nivel, now_millis()),
        )
        .await?;
        debug!("Firestore nivel updated: {} -> {}", username, nivel);
        Ok(())
    }
}

/// Create a Firestore store from a JSON configuration.
pub fn create_firestore_store(
    config: serde_json::Value,
) -> Result<std::sync::Arc<dyn CloudStore>> {
    let config: FirestoreConfig = serde_json::from_value(config)
        .map_err(|e| Error::InvalidInput(format!("Invalid Firestore config: {}", e)))?;
    Ok(std::sync::Arc::new(FirestoreCloudStore::new(config)?))
}
