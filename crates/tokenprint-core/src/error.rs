// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for tokenprint.

use std::io;

use thiserror::Error;

/// Top-level error type for all tokenprint operations.
///
/// Every variant keeps the raw technical text so that callers can show a
/// friendly message while still logging what the device actually said.
#[derive(Debug, Error)]
pub enum TokenprintError {
    // -- Connection errors --
    #[error("no printer configuration found")]
    NoPrinterConfigured,

    #[error("unsupported printer connection: {0}")]
    Unsupported(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("transport already open: {0}")]
    AlreadyOpen(String),

    #[error("transport not open: {0}")]
    NotOpen(String),

    #[error("transport error: {0}")]
    Transport(String),

    // -- Discovery --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenprintError {
    /// Map an I/O error onto the typed connection variants.
    ///
    /// `context` names the device or address involved; it is prefixed to the
    /// raw OS message so the technical detail stays self-explanatory.
    pub fn from_io(context: impl std::fmt::Display, err: io::Error) -> Self {
        let detail = format!("{context}: {err}");
        match err.kind() {
            io::ErrorKind::NotFound => Self::DeviceNotFound(detail),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(detail),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(detail),
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused(detail),
            _ => Self::Transport(detail),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TokenprintError>;
