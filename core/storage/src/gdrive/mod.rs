//! Google Drive storage backend.
//!
//! This module provides a storage adapter over the Drive v3 API with:
//! - Service-account authentication from PKCS#12 or JSON key files
//! - Optional domain-wide delegation to an impersonated user
//! - Existence, deletion and single-field metadata queries by file ID

pub mod auth;
pub mod client;
pub mod credentials;
pub mod storage;

pub use auth::{AccessToken, Authorizer, GoogleTokenEndpoint, TokenSource, DRIVE_SCOPE};
pub use client::{CallOptions, DriveApi, DriveClient, DriveFile};
pub use credentials::{KeyFileFormat, ServiceAccountCredentials};
pub use storage::{create_gdrive_storage, GDriveOptions, GDriveSettings, GDriveStorage};
