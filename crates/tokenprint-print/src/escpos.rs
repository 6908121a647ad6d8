// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS receipt formatting.
//
// Receipts are built as a list of `Command`s first and encoded to bytes as a
// separate step, so the layout can be inspected in tests without decoding
// printer bytes.  Nothing here does I/O.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use tokenprint_core::config::ReceiptConfig;
use tokenprint_core::types::TokenJob;

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const LF: u8 = 0x0A;

/// Lines fed before the cutter so the last printed line clears the blade.
const CUT_FEED_LINES: u8 = 3;

/// Horizontal justification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// One printer directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ESC @`: reset the printer to power-on defaults.
    Initialize,
    /// `ESC M 0`: the standard 12x24 font.
    FontA,
    /// `ESC a n`
    Align(Align),
    /// `ESC E n`
    Bold(bool),
    /// `ESC - n`
    Underline(bool),
    /// `GS ! n`: character magnification, 1 to 8 in each direction.
    Size { width: u8, height: u8 },
    /// A line of text followed by LF.
    Text(String),
    /// Feed past the cutter, then `GS V 0` (full cut).
    Cut,
}

impl Command {
    pub fn text(line: impl Into<String>) -> Self {
        Self::Text(line.into())
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Initialize => out.extend_from_slice(&[ESC, b'@']),
            Self::FontA => out.extend_from_slice(&[ESC, b'M', 0]),
            Self::Align(align) => {
                let n = match align {
                    Align::Left => 0,
                    Align::Center => 1,
                    Align::Right => 2,
                };
                out.extend_from_slice(&[ESC, b'a', n]);
            }
            Self::Bold(on) => out.extend_from_slice(&[ESC, b'E', u8::from(*on)]),
            Self::Underline(on) => out.extend_from_slice(&[ESC, b'-', u8::from(*on)]),
            Self::Size { width, height } => {
                let w = (*width).clamp(1, 8) - 1;
                let h = (*height).clamp(1, 8) - 1;
                out.extend_from_slice(&[GS, b'!', (w << 4) | h]);
            }
            Self::Text(line) => {
                out.extend_from_slice(line.as_bytes());
                out.push(LF);
            }
            Self::Cut => {
                out.extend_from_slice(&[ESC, b'd', CUT_FEED_LINES]);
                out.extend_from_slice(&[GS, b'V', 0]);
            }
        }
    }
}

/// Encode a command sequence to printer bytes.
pub fn encode(commands: &[Command]) -> Vec<u8> {
    let mut out = Vec::with_capacity(commands.len() * 8);
    for command in commands {
        command.encode_into(&mut out);
    }
    out
}

/// Render `at` with a user-supplied strftime pattern.
///
/// A malformed pattern falls back to ISO-8601 instead of failing the print.
fn format_timestamp(at: NaiveDateTime, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(pattern)).is_err() {
        out = at.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    out
}

/// Builds the fixed receipt layouts.
#[derive(Debug, Clone, Default)]
pub struct ReceiptFormatter {
    receipt: ReceiptConfig,
}

impl ReceiptFormatter {
    pub fn new(receipt: ReceiptConfig) -> Self {
        Self { receipt }
    }

    /// The queue-token ticket: title, separator, blank, large bold token
    /// number, blank, date line, blank, instruction, separator, blank, cut.
    pub fn token_receipt(&self, job: &TokenJob) -> Vec<Command> {
        let r = &self.receipt;
        vec![
            Command::Initialize,
            Command::FontA,
            Command::Align(Align::Center),
            Command::Bold(true),
            Command::Underline(true),
            Command::Size { width: 1, height: 1 },
            Command::text(&r.title),
            Command::text(&r.separator),
            Command::text(""),
            Command::Size { width: 2, height: 2 },
            Command::Underline(false),
            Command::text(format!("TOKEN #{}", job.token_number)),
            Command::text(""),
            Command::Size { width: 1, height: 1 },
            Command::Bold(false),
            Command::text(format!(
                "Date: {}",
                format_timestamp(job.timestamp, &r.date_format)
            )),
            Command::text(""),
            Command::text(&r.instruction),
            Command::text(&r.separator),
            Command::text(""),
            Command::Cut,
        ]
    }

    /// Short page proving the link works end to end.
    pub fn test_page(&self, at: NaiveDateTime) -> Vec<Command> {
        vec![
            Command::Initialize,
            Command::FontA,
            Command::Align(Align::Center),
            Command::text("PRINTER TEST"),
            Command::text("Connection Successful"),
            Command::text(format_timestamp(at, &self.receipt.date_format)),
            Command::Cut,
        ]
    }
}
