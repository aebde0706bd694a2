//! Service-account credential loading.
//!
//! A key file is either a PKCS#12 bundle or a Google JSON key file. The
//! format is decided once, from the file's content type and then its
//! extension; both formats end up as the same RS256 signing key.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use drivestore_common::{Error, Result, SensitiveBytes};

/// Passphrase Google issues PKCS#12 service-account keys with.
pub const DEFAULT_P12_PASSPHRASE: &str = "notasecret";
/// OAuth2 token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime of a signed assertion. Google rejects anything over one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Encoding of a private-key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFileFormat {
    /// PKCS#12 binary bundle (`.p12`).
    Pkcs12,
    /// Google service-account JSON key file.
    Json,
}

impl KeyFileFormat {
    /// Determine the encoding of a key file.
    ///
    /// The declared content type wins; the extension is consulted only when
    /// the content type is unknown or not a key format.
    ///
    /// # Errors
    /// - `Error::Configuration` if neither identifies a supported format
    pub fn detect(path: &Path) -> Result<Self> {
        mime_guess::from_path(path)
            .iter()
            .find_map(|mime| Self::from_content_type(mime.essence_str()))
            .or_else(|| Self::from_extension(path))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "invalid key file format: {} (expected a .p12 or .json key file)",
                    path.display()
                ))
            })
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/x-pkcs12" | "application/pkcs12" => Some(Self::Pkcs12),
            "application/json" => Some(Self::Json),
            _ => None,
        }
    }

    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "p12" | "pfx" => Some(Self::Pkcs12),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Google service-account JSON key file. Only the fields we read.
#[derive(Deserialize)]
struct JsonKeyFile {
    #[serde(rename = "type", default)]
    key_type: Option<String>,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Claims of a signed-JWT grant assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Service-account email.
    pub iss: String,
    /// Space-separated OAuth2 scopes.
    pub scope: String,
    /// Token endpoint the assertion is addressed to.
    pub aud: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Impersonated user for domain-wide delegation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Immutable service-account identity.
#[derive(Clone)]
pub struct ServiceAccountCredentials {
    client_email: String,
    signing_key: EncodingKey,
    private_key_id: Option<String>,
    token_uri: String,
    delegated_user: Option<String>,
}

impl ServiceAccountCredentials {
    /// Load credentials from a key file.
    ///
    /// `passphrase` is only used for PKCS#12 bundles and defaults to
    /// [`DEFAULT_P12_PASSPHRASE`].
    ///
    /// # Errors
    /// - `Error::Configuration` for unreadable files, unknown formats,
    ///   wrong passphrases and keys that are not RSA private keys
    pub fn from_key_file(
        path: &Path,
        client_email: &str,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let format = KeyFileFormat::detect(path)?;

        let contents = std::fs::read(path).map(SensitiveBytes::new).map_err(|e| {
            Error::Configuration(format!("cannot read key file {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), ?format, "Loading service account key");

        match format {
            KeyFileFormat::Pkcs12 => {
                Self::from_pkcs12(contents.as_bytes(), client_email, passphrase)
            }
            KeyFileFormat::Json => Self::from_json(contents.as_bytes(), client_email),
        }
    }

    /// Load credentials from PKCS#12 bytes.
    pub fn from_pkcs12(
        bytes: &[u8],
        client_email: &str,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let passphrase = passphrase.unwrap_or(DEFAULT_P12_PASSPHRASE);

        let pfx = p12::PFX::parse(bytes)
            .map_err(|e| Error::Configuration(format!("invalid PKCS#12 key file: {:?}", e)))?;

        if !pfx.verify_mac(passphrase) {
            return Err(Error::Configuration(
                "PKCS#12 key file passphrase is incorrect".to_string(),
            ));
        }

        let der = pfx
            .key_bags(passphrase)
            .map_err(|e| Error::Configuration(format!("cannot decrypt PKCS#12 key: {:?}", e)))?
            .into_iter()
            .next()
            .map(SensitiveBytes::new)
            .ok_or_else(|| {
                Error::Configuration("PKCS#12 key file contains no private key".to_string())
            })?;

        // The key bag holds PKCS#8; jsonwebtoken signs with PKCS#1 DER.
        let key = RsaPrivateKey::from_pkcs8_der(der.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid RSA private key: {}", e)))?;
        let pkcs1 = key
            .to_pkcs1_der()
            .map_err(|e| Error::Configuration(format!("cannot encode RSA private key: {}", e)))?;

        Self::from_signing_key(
            client_email,
            EncodingKey::from_rsa_der(pkcs1.as_bytes()),
            None,
            DEFAULT_TOKEN_URI.to_string(),
        )
    }

    /// Load credentials from a Google JSON key file.
    pub fn from_json(bytes: &[u8], client_email: &str) -> Result<Self> {
        let key: JsonKeyFile = serde_json::from_slice(bytes)
            .map_err(|e| Error::Configuration(format!("invalid JSON key file: {}", e)))?;

        if let Some(key_type) = key.key_type.as_deref() {
            if key_type != "service_account" {
                return Err(Error::Configuration(format!(
                    "JSON key file is not a service account key (type '{}')",
                    key_type
                )));
            }
        }

        if let Some(file_email) = key.client_email.as_deref() {
            if file_email != client_email {
                tracing::warn!(
                    configured = client_email,
                    key_file = file_email,
                    "Configured client email differs from the key file; using the configured one"
                );
            }
        }

        let token_uri = key
            .token_uri
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        let pem = SensitiveBytes::new(key.private_key.into_bytes());
        let signing_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid RSA private key: {}", e)))?;

        Self::from_signing_key(client_email, signing_key, key.private_key_id, token_uri)
    }

    fn from_signing_key(
        client_email: &str,
        signing_key: EncodingKey,
        private_key_id: Option<String>,
        token_uri: String,
    ) -> Result<Self> {
        if client_email.trim().is_empty() {
            return Err(Error::Configuration(
                "service account email cannot be empty".to_string(),
            ));
        }

        url::Url::parse(&token_uri)
            .map_err(|e| Error::Configuration(format!("invalid token URI '{}': {}", token_uri, e)))?;

        Ok(Self {
            client_email: client_email.to_string(),
            signing_key,
            private_key_id,
            token_uri,
            delegated_user: None,
        })
    }

    /// Act on behalf of `user` through domain-wide delegation.
    ///
    /// The assertion is still signed by the service account.
    pub fn delegated(mut self, user: impl Into<String>) -> Self {
        self.delegated_user = Some(user.into());
        self
    }

    /// Service-account email.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Impersonated user, if any.
    pub fn delegated_user(&self) -> Option<&str> {
        self.delegated_user.as_deref()
    }

    /// Token endpoint the assertion is exchanged at.
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Build the claims for an assertion issued at `issued_at`.
    pub fn claims(&self, scope: &str, issued_at: DateTime<Utc>) -> Claims {
        let iat = issued_at.timestamp();
        Claims {
            iss: self.client_email.clone(),
            scope: scope.to_string(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            sub: self.delegated_user.clone(),
        }
    }

    /// Sign an RS256 grant assertion for `scope`.
    pub fn sign_assertion(&self, scope: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        jsonwebtoken::encode(&header, &self.claims(scope, issued_at), &self.signing_key)
            .map_err(|e| Error::Authentication(format!("Failed to sign assertion: {}", e)))
    }
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("delegated_user", &self.delegated_user)
            .finish_non_exhaustive()
    }
}
