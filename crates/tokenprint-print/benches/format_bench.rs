// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for token receipt formatting, ESC/POS encoding, and
// discovery id derivation in the tokenprint-print crate.

use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use tokenprint_core::types::{DiscoveredPrinter, TokenJob, TransportType};
use tokenprint_print::discovery::dedup_by_id;
use tokenprint_print::escpos::{self, ReceiptFormatter};

fn sample_job() -> TokenJob {
    let at = NaiveDate::from_ymd_opt(2026, 1, 15)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid timestamp");
    TokenJob::new(1234, at)
}

/// Format and encode one token receipt (the per-print hot path).
fn bench_token_receipt(c: &mut Criterion) {
    let formatter = ReceiptFormatter::default();
    let job = sample_job();

    c.bench_function("token_receipt + encode", |b| {
        b.iter(|| {
            let bytes = escpos::encode(&formatter.token_receipt(black_box(&job)));
            black_box(bytes);
        });
    });
}

/// Derive ids for a full network sweep's worth of candidates.
fn bench_derive_id(c: &mut Criterion) {
    let conns: Vec<String> = (1..=20u8)
        .flat_map(|host| [9100u16, 515, 631].map(move |port| format!("192.168.1.{host}:{port}")))
        .collect();

    c.bench_function("derive_id (60 candidates)", |b| {
        b.iter(|| {
            for conn in &conns {
                black_box(DiscoveredPrinter::derive_id(
                    TransportType::Network,
                    black_box(conn),
                ));
            }
        });
    });
}

/// Merge and de-duplicate overlapping scanner results.
fn bench_dedup(c: &mut Criterion) {
    let printers: Vec<DiscoveredPrinter> = (0..200u32)
        .map(|i| {
            DiscoveredPrinter::new(
                TransportType::Wifi,
                format!("10.0.{}.{}:9100", i % 4, i % 50),
                "WiFi Printer",
                "bench",
            )
        })
        .collect();

    c.bench_function("dedup_by_id (200 candidates)", |b| {
        b.iter(|| black_box(dedup_by_id(black_box(printers.clone()))));
    });
}

criterion_group!(benches, bench_token_receipt, bench_derive_id, bench_dedup);
criterion_main!(benches);
