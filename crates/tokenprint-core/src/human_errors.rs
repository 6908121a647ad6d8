// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure classification for connection and print errors.
//
// Every technical error is mapped to one `ErrorCategory` and a short sentence
// an operator at the counter can act on.  The raw text always travels with
// it so the cause can still be diagnosed.

use std::io;

use crate::error::TokenprintError;
use crate::types::ErrorCategory;

/// A classified error: category, operator-facing message, raw detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    pub category: ErrorCategory,
    pub message: String,
    pub technical_detail: String,
}

/// Classify an error into its category.
pub fn classify(err: &TokenprintError) -> ErrorCategory {
    match err {
        TokenprintError::NoPrinterConfigured => ErrorCategory::NoPrinterConfigured,
        TokenprintError::Unsupported(_) => ErrorCategory::Unsupported,
        TokenprintError::DeviceNotFound(_) => ErrorCategory::DeviceNotFound,
        TokenprintError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
        TokenprintError::Timeout(_) => ErrorCategory::Timeout,
        TokenprintError::ConnectionRefused(_) => ErrorCategory::ConnectionRefused,

        TokenprintError::Io(io_err) => match io_err.kind() {
            io::ErrorKind::NotFound => ErrorCategory::DeviceNotFound,
            io::ErrorKind::PermissionDenied => ErrorCategory::PermissionDenied,
            io::ErrorKind::TimedOut => ErrorCategory::Timeout,
            io::ErrorKind::ConnectionRefused => ErrorCategory::ConnectionRefused,
            _ => classify_detail(&io_err.to_string()),
        },

        TokenprintError::AlreadyOpen(detail)
        | TokenprintError::NotOpen(detail)
        | TokenprintError::Transport(detail)
        | TokenprintError::Discovery(detail)
        | TokenprintError::Database(detail) => classify_detail(detail),

        TokenprintError::Serialization(_) => ErrorCategory::Unknown,
    }
}

/// Classify an untyped error message.
///
/// Drivers that only hand back text (serial stacks, OS tools) are matched on
/// the errno names and phrases they commonly use.
pub fn classify_detail(detail: &str) -> ErrorCategory {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("no printer configuration") {
        ErrorCategory::NoPrinterConfigured
    } else if lower.contains("enoent")
        || lower.contains("device not found")
        || lower.contains("no such file")
    {
        ErrorCategory::DeviceNotFound
    } else if lower.contains("eacces") || lower.contains("permission denied") {
        ErrorCategory::PermissionDenied
    } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("etimedout")
    {
        ErrorCategory::Timeout
    } else if lower.contains("econnrefused") || lower.contains("connection refused") {
        ErrorCategory::ConnectionRefused
    } else {
        ErrorCategory::Unknown
    }
}

/// Operator-facing sentence for a category.
///
/// `detail` is only embedded for `Unknown`, where there is nothing better to
/// say than the raw message.
pub fn user_message(category: ErrorCategory, detail: &str) -> String {
    match category {
        ErrorCategory::NoPrinterConfigured => {
            "No printer configured. Please set up a printer first.".into()
        }
        ErrorCategory::Unsupported => {
            "This printer connection type isn't available on this computer.".into()
        }
        ErrorCategory::DeviceNotFound => {
            "Printer not found. Check if printer is connected and powered on.".into()
        }
        ErrorCategory::PermissionDenied => "Permission denied. Check printer permissions.".into(),
        ErrorCategory::Timeout => {
            "Printer connection timeout. Check if printer is responding.".into()
        }
        ErrorCategory::ConnectionRefused => {
            "Cannot connect to printer. Check network connection.".into()
        }
        ErrorCategory::Unknown => format!("Printer error: {detail}"),
    }
}

/// Classify an error and attach the operator message and raw detail.
pub fn humanize_error(err: &TokenprintError) -> HumanError {
    let technical_detail = err.to_string();
    let category = classify(err);
    HumanError {
        category,
        message: user_message(category, &technical_detail),
        technical_detail,
    }
}
