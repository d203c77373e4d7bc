//! Shared Module
//!
//! This module contains types and data structures that are shared between
//! the check-in client and the sync server. These types are used for
//! serialization and communication over the reconciliation endpoint.
//!
//! # Overview
//!
//! The shared module provides platform-agnostic types that can be used
//! in both server and client code. All types are designed for serialization
//! and transmission over HTTP.

/// Queued write operations
pub mod queue;

/// Attendance check-in payloads
pub mod attendance;

/// Reconciliation endpoint request/response bodies
pub mod sync;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use attendance::{AttendancePayload, CheckIn, CheckInMethod, ServiceType};
pub use config::{AppConfig, AppConfigBuilder, ConfigError};
pub use error::SharedError;
pub use queue::{EntityType, OperationKind, QueueItem};
pub use sync::{
    SyncErrorBody, SyncOperation, SyncRequest, SyncResponse, SyncStatusQuery, SyncStatusResponse,
};
