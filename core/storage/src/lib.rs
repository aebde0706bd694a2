//! Storage backends for drivestore.
//!
//! This module provides a trait-based interface for named-blob storage
//! (Google Drive, in-memory) and a registry for resolving a backend by name
//! from host-application configuration.
//!
//! # Design Principles
//! - Backend isolation: no Drive-specific types leak through `Storage`
//! - Async operations: every remote call is a single awaited round trip
//! - Unified error semantics: all backends report `drivestore_common::Error`

pub mod gdrive;
pub mod memory;
pub mod registry;
pub mod storage;

pub use gdrive::{GDriveOptions, GDriveSettings, GDriveStorage};
pub use memory::MemoryStorage;
pub use registry::{create_default_registry, StorageFactory, StorageRegistry};
pub use storage::{Listing, Storage};
