// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: builds the printer subsystem once and exposes it to the
// CLI commands.

pub mod app_services;
pub mod data_dir;
