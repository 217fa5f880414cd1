//! Error types for the devkit application.
//!
//! This module defines the error categories that can surface from the
//! persistence layer, the board, backups and the text tools.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the devkit application.
#[derive(Error, Debug)]
pub enum DevkitError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to zip operations.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// A write to the key-value store did not go through (quota, disabled
    /// storage, unwritable file).
    #[error("Storage unavailable while writing '{key}': {message}")]
    StorageUnavailable { key: String, message: String },

    /// Record was not found when performing an operation.
    #[error("Record not found: {id}")]
    RecordNotFound { id: String },

    /// Task was not found on the board.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// Column was not found on the board.
    #[error("Column not found: {id}")]
    ColumnNotFound { id: String },

    /// Invalid stored data or user input.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Errors related to backup operations.
    #[error("Backup failed: {message}")]
    BackupFailed { message: String },

    /// Error when attempting to restore from backup.
    #[error("Restore failed: {message}")]
    RestoreFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },
}

/// Validation failure from one of the text tools.
///
/// These are shown inline next to the input that produced them and are
/// never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Invalid JSON at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid Base64: {0}")]
    InvalidBase64(String),

    #[error("Decoded bytes are not valid UTF-8")]
    InvalidUtf8,
}
