//! Google Drive API client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use url::Url;

use drivestore_common::{Error, FileId, Result};

use super::auth::{Authorizer, TokenSource};
use super::credentials::ServiceAccountCredentials;

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive file metadata from API.
///
/// Every field is optional: callers request only the fields they read with
/// the `fields` query parameter, and the API omits everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    #[serde(default)]
    pub id: Option<String>,
    /// File size in bytes. Only set for binary files, never for
    /// Google-native documents or folders.
    #[serde(default)]
    pub size: Option<String>,
    /// Modified time.
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    /// Last time the file was viewed by the authenticated user.
    #[serde(default)]
    pub viewed_by_me_time: Option<DateTime<Utc>>,
    /// Link for downloading the content in a browser.
    #[serde(default)]
    pub web_content_link: Option<String>,
}

impl DriveFile {
    /// Get size as u64.
    ///
    /// # Errors
    /// - `Error::Serialization` if the API sent a size that is not an integer
    pub fn size_bytes(&self) -> Result<Option<u64>> {
        self.size
            .as_deref()
            .map(|s| {
                s.parse().map_err(|e| {
                    Error::Serialization(format!("Invalid file size '{}': {}", s, e))
                })
            })
            .transpose()
    }
}

/// Error body returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Per-call behaviour flags attached to every Drive request.
///
/// `None` leaves the parameter off the request so the API default applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Operate on items in shared drives.
    pub supports_team_drives: Option<bool>,
    /// Allow access to files flagged as abusive.
    pub acknowledge_abuse: Option<bool>,
}

impl CallOptions {
    /// Query parameters for `files.get`.
    pub fn get_params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.delete_params();
        if let Some(ack) = self.acknowledge_abuse {
            params.push(("acknowledgeAbuse", ack.to_string()));
        }
        params
    }

    /// Query parameters for `files.delete`, which does not take
    /// `acknowledgeAbuse`.
    pub fn delete_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(shared) = self.supports_team_drives {
            params.push(("supportsAllDrives", shared.to_string()));
        }
        params
    }
}

/// Remote calls the storage adapter needs from Google Drive.
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Fetch the metadata `fields` of a file.
    async fn get_file(
        &self,
        file_id: &FileId,
        fields: &str,
        options: &CallOptions,
    ) -> Result<DriveFile>;

    /// Permanently delete a file.
    async fn delete_file(&self, file_id: &FileId, options: &CallOptions) -> Result<()>;
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    authorizer: Arc<Authorizer>,
    base_url: Url,
}

impl DriveClient {
    /// Create a new Drive client bound to the v3 API.
    pub fn new(authorizer: Arc<Authorizer>) -> Result<Self> {
        Self::with_base_url(authorizer, DRIVE_API_BASE)
    }

    /// Create a Drive client against another API root, such as a local
    /// mock server.
    pub fn with_base_url(authorizer: Arc<Authorizer>, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("drivestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Configuration(format!("Invalid API base URL: {}", e)))?;

        Ok(Self {
            http,
            authorizer,
            base_url,
        })
    }

    /// Build a client from a key file.
    ///
    /// # Errors
    /// - `Error::Configuration` if the key file cannot be loaded
    pub fn from_key_file(
        key_path: &Path,
        client_email: &str,
        passphrase: Option<&str>,
        delegated_user: Option<&str>,
        source: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let mut credentials =
            ServiceAccountCredentials::from_key_file(key_path, client_email, passphrase)?;
        if let Some(user) = delegated_user {
            credentials = credentials.delegated(user);
        }

        Self::new(Arc::new(Authorizer::new(credentials, source)))
    }

    /// The authorization context used for every request.
    pub fn authorizer(&self) -> &Arc<Authorizer> {
        &self.authorizer
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.authorizer.access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    /// URL of a single file resource.
    fn file_url(&self, file_id: &FileId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("API base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .push("files")
            .push(file_id.as_str());
        Ok(url)
    }

    /// Map a failed response to an error.
    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error_for_status(status, &body)
    }
}

/// Classify a non-success API status.
fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string());

    match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::FORBIDDEN => Error::PermissionDenied(message),
        StatusCode::UNAUTHORIZED => Error::Authentication(message),
        _ => Error::Request {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn get_file(
        &self,
        file_id: &FileId,
        fields: &str,
        options: &CallOptions,
    ) -> Result<DriveFile> {
        let url = self.file_url(file_id)?;
        let auth = self.auth_header().await?;

        tracing::debug!(file_id = %file_id, fields, "GET file metadata");

        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", fields)])
            .query(&options.get_params())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }

    async fn delete_file(&self, file_id: &FileId, options: &CallOptions) -> Result<()> {
        let url = self.file_url(file_id)?;
        let auth = self.auth_header().await?;

        tracing::debug!(file_id = %file_id, "DELETE file");

        let response = self
            .http
            .delete(url)
            .header(header::AUTHORIZATION, auth)
            .query(&options.delete_params())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete file: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }
}
