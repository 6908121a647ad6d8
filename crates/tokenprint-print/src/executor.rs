// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Token print jobs.
//
// The executor formats a token receipt and hands the bytes to the connection
// manager, which initializes the default printer when needed.  Failures come
// back as classified `PrintResult`s, never as errors, and nothing is retried
// here.

use std::sync::Arc;

use tracing::{info, warn};

use tokenprint_core::human_errors::humanize_error;
use tokenprint_core::types::{BatchSummary, PrintResult, TokenJob};

use crate::connection::ConnectionManager;
use crate::escpos::{self, ReceiptFormatter};

/// Prints token receipts on the connection manager's current printer.
pub struct PrintJobExecutor {
    connection: Arc<ConnectionManager>,
    formatter: ReceiptFormatter,
}

impl PrintJobExecutor {
    pub fn new(connection: Arc<ConnectionManager>, formatter: ReceiptFormatter) -> Self {
        Self {
            connection,
            formatter,
        }
    }

    /// Print one token.
    pub async fn print_one(&self, job: &TokenJob) -> PrintResult {
        let bytes = escpos::encode(&self.formatter.token_receipt(job));
        match self.connection.transmit(&bytes).await {
            Ok(()) => {
                info!(token = job.token_number, "token printed");
                PrintResult::printed(job.token_number)
            }
            Err(e) => {
                let human = humanize_error(&e);
                warn!(
                    token = job.token_number,
                    category = ?human.category,
                    error = %e,
                    "token print failed"
                );
                PrintResult::failed(
                    job.token_number,
                    human.category,
                    human.message,
                    human.technical_detail,
                )
            }
        }
    }

    /// Print a token again.  Same path as [`print_one`](Self::print_one).
    pub async fn reprint(&self, job: &TokenJob) -> PrintResult {
        info!(token = job.token_number, "reprinting token");
        self.print_one(job).await
    }

    /// Print tokens one after another.  A failed job does not stop the rest.
    pub async fn print_many(&self, jobs: &[TokenJob]) -> BatchSummary {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.print_one(job).await);
        }
        let summary = BatchSummary::from_results(results);
        info!(
            status = ?summary.status,
            printed = summary.printed,
            failed = summary.failed,
            "token batch finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tokenprint_core::types::{BatchStatus, ErrorCategory, PrinterConfig, TransportType};

    use super::*;
    use crate::store::{MemoryPrinterStore, PrinterStore};
    use crate::transport::testing::{Fault, RecordingFactory};

    fn job(token: u32) -> TokenJob {
        let at = NaiveDate::from_ymd_opt(2026, 3, 4)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        TokenJob::new(token, at)
    }

    fn executor(printers: Vec<PrinterConfig>, factory: &RecordingFactory) -> PrintJobExecutor {
        let store: Arc<dyn PrinterStore> =
            Arc::new(MemoryPrinterStore::with_printers(printers).unwrap());
        let manager = ConnectionManager::new(store, factory.registry(), ReceiptFormatter::default());
        PrintJobExecutor::new(Arc::new(manager), ReceiptFormatter::default())
    }

    fn counter() -> PrinterConfig {
        PrinterConfig::new("Counter", TransportType::Network, "10.0.0.9:9100").as_default()
    }

    #[tokio::test]
    async fn print_writes_the_formatted_receipt() {
        let factory = RecordingFactory::default();
        let exec = executor(vec![counter()], &factory);

        let result = exec.print_one(&job(42)).await;
        assert_eq!(result, PrintResult::printed(42));

        let expected = escpos::encode(&ReceiptFormatter::default().token_receipt(&job(42)));
        let log = factory.log.lock().unwrap();
        assert_eq!(log.writes, vec![expected]);
        assert_eq!(log.opens, 1);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn missing_printer_is_returned_as_data() {
        let factory = RecordingFactory::default();
        let exec = executor(Vec::new(), &factory);

        let result = exec.print_one(&job(7)).await;
        assert!(!result.success);
        assert_eq!(result.token_number, 7);
        assert_eq!(result.error_category, Some(ErrorCategory::NoPrinterConfigured));
        assert_eq!(
            result.user_message.as_deref(),
            Some("No printer configured. Please set up a printer first.")
        );
        assert!(result.technical_detail.is_some());
    }

    #[tokio::test]
    async fn refused_open_is_classified() {
        let factory = RecordingFactory::default();
        factory.set_fault(Fault::OpenRefused);
        let exec = executor(vec![counter()], &factory);

        let result = exec.print_one(&job(3)).await;
        assert_eq!(result.error_category, Some(ErrorCategory::ConnectionRefused));
        assert!(
            result
                .technical_detail
                .as_deref()
                .unwrap()
                .contains("10.0.0.9:9100")
        );
    }

    #[tokio::test]
    async fn reprint_is_not_retried_on_failure() {
        let factory = RecordingFactory::default();
        factory.set_fault(Fault::WriteFails);
        let exec = executor(vec![counter()], &factory);

        let result = exec.reprint(&job(11)).await;
        assert!(!result.success);
        let log = factory.log.lock().unwrap();
        assert_eq!(log.opens, 1);
        assert_eq!(log.closes, 1);
        assert!(log.writes.is_empty());
    }

    #[tokio::test]
    async fn batch_reports_every_job() {
        let factory = RecordingFactory::default();
        let exec = executor(vec![counter()], &factory);

        let summary = exec.print_many(&[job(1), job(2), job(3)]).await;
        assert_eq!(summary.status, BatchStatus::Success);
        assert_eq!(summary.printed, 3);
        assert_eq!(factory.log.lock().unwrap().writes.len(), 3);
    }

    #[tokio::test]
    async fn failing_printer_fails_the_whole_batch() {
        let factory = RecordingFactory::default();
        factory.set_fault(Fault::WriteFails);
        let exec = executor(vec![counter()], &factory);

        let summary = exec.print_many(&[job(1), job(2)]).await;
        assert_eq!(summary.status, BatchStatus::Failed);
        assert_eq!(summary.failed, 2);
        assert!(
            summary
                .results
                .iter()
                .all(|r| r.error_category == Some(ErrorCategory::Unknown))
        );
    }
}
