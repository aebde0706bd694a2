//! Google Drive storage adapter implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drivestore_common::{Error, FileId, Result};

use crate::storage::{Listing, Storage};

use super::auth::GoogleTokenEndpoint;
use super::client::{CallOptions, DriveApi, DriveClient, DriveFile};

/// Environment variable naming the private-key file.
pub const ENV_PKEY_FILE_PATH: &str = "GDRIVE_PKEY_FILE_PATH";
/// Environment variable naming the service-account email.
pub const ENV_CLIENT_EMAIL: &str = "GDRIVE_CLIENT_EMAIL";
/// Environment variable holding the PKCS#12 passphrase.
pub const ENV_PKEY_PASSPHRASE: &str = "GDRIVE_PKEY_PASSPHRASE";

/// Credentials settings supplied by the host application.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GDriveSettings {
    /// Local path to the private key file (`.p12` or `.json`).
    #[serde(default)]
    pub pkey_file_path: Option<PathBuf>,
    /// Email associated with the service account.
    #[serde(default)]
    pub client_email: Option<String>,
    /// Passphrase of a PKCS#12 key file.
    #[serde(default, skip_serializing)]
    pub pkey_passphrase: Option<String>,
}

impl GDriveSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            pkey_file_path: get(ENV_PKEY_FILE_PATH).map(PathBuf::from),
            client_email: get(ENV_CLIENT_EMAIL),
            pkey_passphrase: get(ENV_PKEY_PASSPHRASE),
        }
    }

    /// Fill unset values from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            pkey_file_path: self.pkey_file_path.or(fallback.pkey_file_path),
            client_email: self.client_email.or(fallback.client_email),
            pkey_passphrase: self.pkey_passphrase.or(fallback.pkey_passphrase),
        }
    }

    /// The required key path and client email.
    ///
    /// # Errors
    /// - `Error::Configuration` naming every missing setting
    pub fn required(&self) -> Result<(&Path, &str)> {
        match (self.pkey_file_path.as_deref(), self.client_email.as_deref()) {
            (Some(path), Some(email)) => Ok((path, email)),
            (path, email) => {
                let missing: Vec<&str> = [
                    path.is_none().then_some(ENV_PKEY_FILE_PATH),
                    email.is_none().then_some(ENV_CLIENT_EMAIL),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(Error::Configuration(format!(
                    "missing required setting(s): {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

impl fmt::Debug for GDriveSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GDriveSettings")
            .field("pkey_file_path", &self.pkey_file_path)
            .field("client_email", &self.client_email)
            .field(
                "pkey_passphrase",
                &self.pkey_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Behaviour options captured at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GDriveOptions {
    /// Email of the user to impersonate through domain-wide delegation.
    #[serde(default)]
    pub create_delegated: Option<String>,
    /// Operate on items in shared drives.
    #[serde(default, rename = "supportsTeamDrives")]
    pub supports_team_drives: Option<bool>,
    /// Allow access to files flagged as abusive.
    #[serde(default, rename = "acknowledgeAbuse")]
    pub acknowledge_abuse: Option<bool>,
}

impl GDriveOptions {
    /// Delegated user, treating a blank email as none.
    pub fn delegated_user(&self) -> Option<&str> {
        self.create_delegated
            .as_deref()
            .filter(|user| !user.trim().is_empty())
    }

    /// Flags attached to each remote call.
    pub fn call_options(&self) -> CallOptions {
        CallOptions {
            supports_team_drives: self.supports_team_drives,
            acknowledge_abuse: self.acknowledge_abuse,
        }
    }
}

/// Google Drive storage adapter.
///
/// Storage names are Drive file IDs. Each operation is one independent
/// round trip; nothing is cached between calls.
pub struct GDriveStorage {
    api: Arc<dyn DriveApi>,
    options: GDriveOptions,
    call_options: CallOptions,
}

impl GDriveStorage {
    /// Create a Google Drive adapter from settings and options.
    ///
    /// # Errors
    /// - `Error::Configuration` if the key path or client email is missing
    ///   (checked before any I/O), or the key file cannot be loaded
    pub fn new(settings: &GDriveSettings, options: GDriveOptions) -> Result<Self> {
        let (key_path, client_email) = settings.required()?;

        let client = DriveClient::from_key_file(
            key_path,
            client_email,
            settings.pkey_passphrase.as_deref(),
            options.delegated_user(),
            Arc::new(GoogleTokenEndpoint::new()?),
        )?;

        tracing::info!(
            client_email,
            delegated_user = ?options.delegated_user(),
            "Google Drive storage ready"
        );

        Ok(Self::with_api(Arc::new(client), options))
    }

    /// Create an adapter over an existing API implementation.
    pub fn with_api(api: Arc<dyn DriveApi>, options: GDriveOptions) -> Self {
        let call_options = options.call_options();
        Self {
            api,
            options,
            call_options,
        }
    }

    /// Options captured at construction.
    pub fn options(&self) -> &GDriveOptions {
        &self.options
    }

    /// Fetch a single metadata field set for `name`.
    async fn fetch(&self, name: &str, fields: &str) -> Result<DriveFile> {
        let file_id = FileId::new(name)?;
        self.api.get_file(&file_id, fields, &self.call_options).await
    }
}

#[async_trait]
impl Storage for GDriveStorage {
    fn name(&self) -> &str {
        "gdrive"
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self.fetch(name, "id").await {
            Ok(_) => Ok(true),
            Err(e) if e.is_request_error() => {
                tracing::debug!(file_id = name, error = %e, "Treating file as absent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let file_id = FileId::new(name)?;
        self.api.delete_file(&file_id, &self.call_options).await?;
        tracing::info!(file_id = name, "Deleted file");
        Ok(())
    }

    async fn size(&self, name: &str) -> Result<Option<u64>> {
        self.fetch(name, "size").await?.size_bytes()
    }

    async fn modified_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.fetch(name, "modifiedTime").await?.modified_time)
    }

    async fn accessed_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.fetch(name, "viewedByMeTime").await?.viewed_by_me_time)
    }

    async fn url(&self, name: &str) -> Result<Option<String>> {
        Ok(self.fetch(name, "webContentLink").await?.web_content_link)
    }

    async fn open(&self, _name: &str) -> Result<Vec<u8>> {
        Err(Error::Unsupported(
            "gdrive storage does not read file content".to_string(),
        ))
    }

    async fn save(&self, _name: &str, _data: Vec<u8>) -> Result<String> {
        Err(Error::Unsupported(
            "gdrive storage does not write file content".to_string(),
        ))
    }

    async fn listdir(&self, _path: &str) -> Result<Listing> {
        Err(Error::Unsupported(
            "gdrive storage has no directory hierarchy".to_string(),
        ))
    }
}

/// Adapter configuration as read from a JSON value.
#[derive(Debug, Default, Deserialize)]
struct GDriveStorageConfig {
    #[serde(flatten)]
    settings: GDriveSettings,
    #[serde(flatten)]
    options: GDriveOptions,
}

/// Create a Google Drive adapter from configuration.
///
/// Settings missing from `config` are read from the environment.
pub fn create_gdrive_storage(config: serde_json::Value) -> Result<Arc<dyn Storage>> {
    let config: GDriveStorageConfig = if config.is_null() {
        GDriveStorageConfig::default()
    } else {
        serde_json::from_value(config)
            .map_err(|e| Error::Configuration(format!("Invalid gdrive config: {}", e)))?
    };

    let settings = config.settings.or(GDriveSettings::from_env());
    Ok(Arc::new(GDriveStorage::new(&settings, config.options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdrive::auth::tests::RecordingTokenSource;
    use crate::gdrive::auth::Authorizer;
    use crate::gdrive::credentials::tests::{fixture, CLIENT_EMAIL};
    use crate::gdrive::credentials::ServiceAccountCredentials;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// What the double replies to `get_file`.
    #[derive(Clone)]
    enum Reply {
        File(DriveFile),
        Status(u16),
        Network,
        Unauthorized,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        op: &'static str,
        file_id: String,
        fields: Option<String>,
        options: CallOptions,
    }

    /// Drive API double that records every call.
    struct RecordingApi {
        reply: Reply,
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingApi {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self) -> Result<DriveFile> {
            match &self.reply {
                Reply::File(file) => Ok(file.clone()),
                Reply::Status(404) => Err(Error::NotFound("File not found".to_string())),
                Reply::Status(403) => Err(Error::PermissionDenied("Forbidden".to_string())),
                Reply::Status(status) => Err(Error::Request {
                    status: *status,
                    message: "rejected".to_string(),
                }),
                Reply::Network => Err(Error::Network("connection reset".to_string())),
                Reply::Unauthorized => Err(Error::Authentication("invalid_grant".to_string())),
            }
        }
    }

    #[async_trait]
    impl DriveApi for RecordingApi {
        async fn get_file(
            &self,
            file_id: &FileId,
            fields: &str,
            options: &CallOptions,
        ) -> Result<DriveFile> {
            self.calls.lock().unwrap().push(Call {
                op: "get",
                file_id: file_id.to_string(),
                fields: Some(fields.to_string()),
                options: *options,
            });
            self.respond()
        }

        async fn delete_file(&self, file_id: &FileId, options: &CallOptions) -> Result<()> {
            self.calls.lock().unwrap().push(Call {
                op: "delete",
                file_id: file_id.to_string(),
                fields: None,
                options: *options,
            });
            self.respond().map(|_| ())
        }
    }

    fn storage_with(reply: Reply) -> (GDriveStorage, Arc<RecordingApi>) {
        let api = RecordingApi::new(reply);
        let storage = GDriveStorage::with_api(api.clone(), GDriveOptions::default());
        (storage, api)
    }

    fn settings(path: Option<PathBuf>, email: Option<&str>) -> GDriveSettings {
        GDriveSettings {
            pkey_file_path: path,
            client_email: email.map(String::from),
            pkey_passphrase: None,
        }
    }

    fn expect_configuration_error(result: Result<GDriveStorage>) -> String {
        match result {
            Err(Error::Configuration(msg)) => msg,
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("construction should have failed"),
        }
    }

    #[test]
    fn test_no_gdrive_settings() {
        let msg = expect_configuration_error(GDriveStorage::new(
            &GDriveSettings::default(),
            GDriveOptions::default(),
        ));
        assert!(msg.contains(ENV_PKEY_FILE_PATH));
        assert!(msg.contains(ENV_CLIENT_EMAIL));
    }

    #[test]
    fn test_still_one_missing_setting() {
        let msg = expect_configuration_error(GDriveStorage::new(
            &settings(Some(PathBuf::from("/fake/path.p12")), None),
            GDriveOptions::default(),
        ));
        assert!(msg.contains(ENV_CLIENT_EMAIL));
        assert!(!msg.contains(ENV_PKEY_FILE_PATH));

        let msg = expect_configuration_error(GDriveStorage::new(
            &settings(None, Some(CLIENT_EMAIL)),
            GDriveOptions::default(),
        ));
        assert!(msg.contains(ENV_PKEY_FILE_PATH));
    }

    #[test]
    fn test_unknown_key_file_format() {
        let key = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let msg = expect_configuration_error(GDriveStorage::new(
            &settings(Some(key.path().to_path_buf()), Some(CLIENT_EMAIL)),
            GDriveOptions::default(),
        ));
        assert!(msg.contains("invalid key file format"));
    }

    #[test]
    fn test_create_gdrive_storage_instance() {
        for key in ["service-account.json", "service-account.p12"] {
            let storage = GDriveStorage::new(
                &settings(Some(fixture(key)), Some(CLIENT_EMAIL)),
                GDriveOptions {
                    create_delegated: Some("alice@example.com".to_string()),
                    supports_team_drives: Some(true),
                    acknowledge_abuse: None,
                },
            )
            .unwrap();

            assert_eq!(storage.name(), "gdrive");
            assert_eq!(storage.options().supports_team_drives, Some(true));
        }
    }

    #[test]
    fn test_settings_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_PKEY_FILE_PATH, "/keys/sa.p12"),
            (ENV_CLIENT_EMAIL, CLIENT_EMAIL),
            (ENV_PKEY_PASSPHRASE, "  "),
        ]
        .into_iter()
        .collect();

        let settings = GDriveSettings::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.pkey_file_path, Some(PathBuf::from("/keys/sa.p12")));
        assert_eq!(settings.client_email.as_deref(), Some(CLIENT_EMAIL));
        assert_eq!(settings.pkey_passphrase, None);

        let (path, email) = settings.required().unwrap();
        assert_eq!(path, Path::new("/keys/sa.p12"));
        assert_eq!(email, CLIENT_EMAIL);
    }

    #[test]
    fn test_settings_fallback() {
        let explicit = settings(None, Some("explicit@example.com"));
        let env = settings(Some(PathBuf::from("/env/key.json")), Some("env@example.com"));

        let merged = explicit.or(env);
        assert_eq!(merged.client_email.as_deref(), Some("explicit@example.com"));
        assert_eq!(merged.pkey_file_path, Some(PathBuf::from("/env/key.json")));
    }

    #[test]
    fn test_settings_debug_redacts_passphrase() {
        let mut s = settings(None, None);
        s.pkey_passphrase = Some("hunter2".to_string());
        assert!(!format!("{:?}", s).contains("hunter2"));
    }

    #[test]
    fn test_options_deserialize_host_names() {
        let options: GDriveOptions = serde_json::from_value(serde_json::json!({
            "create_delegated": "",
            "supportsTeamDrives": true,
            "acknowledgeAbuse": false,
        }))
        .unwrap();

        assert_eq!(options.delegated_user(), None);
        assert_eq!(
            options.call_options(),
            CallOptions {
                supports_team_drives: Some(true),
                acknowledge_abuse: Some(false),
            }
        );
    }

    #[tokio::test]
    async fn test_exists_true_when_metadata_fetch_succeeds() {
        let (storage, api) = storage_with(Reply::File(DriveFile::default()));

        assert!(storage.exists("1AbC").await.unwrap());

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, "get");
        assert_eq!(calls[0].file_id, "1AbC");
    }

    #[tokio::test]
    async fn test_exists_false_on_request_error() {
        for status in [404, 403, 400, 500] {
            let (storage, _) = storage_with(Reply::Status(status));
            assert!(!storage.exists("synthetic-id").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_exists_answers_for_ids_with_slashes() {
        let (storage, api) = storage_with(Reply::Status(404));

        assert!(!storage.exists("a/b").await.unwrap());

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].file_id, "a/b");
    }

    #[tokio::test]
    async fn test_exists_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/1AbC"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "1AbC" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": 404, "message": "File not found: missing." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = ServiceAccountCredentials::from_key_file(
            &fixture("service-account.json"),
            CLIENT_EMAIL,
            None,
        )
        .unwrap();
        let authorizer = Arc::new(Authorizer::new(
            credentials,
            Arc::new(RecordingTokenSource::new(chrono::Duration::hours(1))),
        ));
        let client = DriveClient::with_base_url(authorizer, &server.uri()).unwrap();
        let storage = GDriveStorage::with_api(Arc::new(client), GDriveOptions::default());

        assert!(storage.exists("1AbC").await.unwrap());
        assert!(!storage.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_propagates_transport_and_auth_failures() {
        let (storage, _) = storage_with(Reply::Network);
        assert!(matches!(
            storage.exists("1AbC").await,
            Err(Error::Network(_))
        ));

        let (storage, _) = storage_with(Reply::Unauthorized);
        assert!(matches!(
            storage.exists("1AbC").await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_issues_one_call_with_shared_drive_flag() {
        let api = RecordingApi::new(Reply::File(DriveFile::default()));
        let storage = GDriveStorage::with_api(
            api.clone(),
            GDriveOptions {
                supports_team_drives: Some(true),
                ..Default::default()
            },
        );

        storage.delete("1AbC").await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, "delete");
        assert_eq!(calls[0].file_id, "1AbC");
        assert_eq!(calls[0].options.supports_team_drives, Some(true));
    }

    #[tokio::test]
    async fn test_delete_surfaces_remote_failure() {
        let (storage, _) = storage_with(Reply::Status(404));
        assert!(matches!(
            storage.delete("1AbC").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_getters_return_fields() {
        let modified = "2024-03-01T10:15:30Z".parse::<DateTime<Utc>>().unwrap();
        let viewed = "2024-03-02T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let link = "https://drive.google.com/uc?id=1AbC&export=download".to_string();

        let (storage, api) = storage_with(Reply::File(DriveFile {
            size: Some("2048".to_string()),
            modified_time: Some(modified),
            viewed_by_me_time: Some(viewed),
            web_content_link: Some(link.clone()),
            ..Default::default()
        }));

        assert_eq!(storage.size("1AbC").await.unwrap(), Some(2048));
        assert_eq!(storage.modified_time("1AbC").await.unwrap(), Some(modified));
        assert_eq!(storage.accessed_time("1AbC").await.unwrap(), Some(viewed));
        assert_eq!(storage.url("1AbC").await.unwrap(), Some(link));

        let fields: Vec<Option<String>> = api.calls().into_iter().map(|c| c.fields).collect();
        assert_eq!(
            fields,
            vec![
                Some("size".to_string()),
                Some("modifiedTime".to_string()),
                Some("viewedByMeTime".to_string()),
                Some("webContentLink".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_metadata_getters_absent_fields() {
        // A Google Docs document has no binary size or download link.
        let (storage, _) = storage_with(Reply::File(DriveFile::default()));

        assert_eq!(storage.size("doc").await.unwrap(), None);
        assert_eq!(storage.modified_time("doc").await.unwrap(), None);
        assert_eq!(storage.accessed_time("doc").await.unwrap(), None);
        assert_eq!(storage.url("doc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_getters_propagate_remote_errors() {
        let (storage, _) = storage_with(Reply::Status(404));
        assert!(matches!(storage.size("gone").await, Err(Error::NotFound(_))));
        assert!(matches!(storage.url("gone").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_flags_attached_to_metadata_calls() {
        let api = RecordingApi::new(Reply::File(DriveFile::default()));
        let storage = GDriveStorage::with_api(
            api.clone(),
            GDriveOptions {
                create_delegated: None,
                supports_team_drives: Some(false),
                acknowledge_abuse: Some(true),
            },
        );

        storage.exists("a").await.unwrap();
        storage.size("a").await.unwrap();

        for call in api.calls() {
            assert_eq!(call.options.supports_team_drives, Some(false));
            assert_eq!(call.options.acknowledge_abuse, Some(true));
        }
    }

    #[tokio::test]
    async fn test_content_operations_unsupported() {
        let (storage, api) = storage_with(Reply::File(DriveFile::default()));

        assert!(matches!(storage.open("a").await, Err(Error::Unsupported(_))));
        assert!(matches!(
            storage.save("a", vec![1]).await,
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(storage.listdir("/").await, Err(Error::Unsupported(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_makes_no_call() {
        let (storage, api) = storage_with(Reply::File(DriveFile::default()));
        assert!(matches!(storage.exists("").await, Err(Error::InvalidInput(_))));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_create_gdrive_storage_factory() {
        let config = serde_json::json!({
            "pkey_file_path": fixture("service-account.json"),
            "client_email": CLIENT_EMAIL,
            "supportsTeamDrives": true,
        });

        let storage = create_gdrive_storage(config).unwrap();
        assert_eq!(storage.name(), "gdrive");
    }

    #[test]
    fn test_create_gdrive_storage_invalid_config() {
        let config = serde_json::json!({ "supportsTeamDrives": "yes please" });
        assert!(matches!(
            create_gdrive_storage(config),
            Err(Error::Configuration(_))
        ));
    }
}
