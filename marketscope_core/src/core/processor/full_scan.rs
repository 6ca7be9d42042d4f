use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::{
    core::{
        predicate::Predicate,
        record::Record,
        schema::{OrderBy, TableDescriptor},
    },
    error::EngineError,
    source::DataSource,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scanned: u64,
    /// The safety cap stopped the scan while rows remained.
    pub truncated: bool,
}

/// Reads every matching record in primary-key order, one batch at a time.
///
/// The scan ends once a short batch is confirmed to be the last one, or once
/// `scan_cap` rows were visited. A source that caps pages below `batch_size`
/// shrinks the batch to its cap. A failed batch aborts the whole scan, and so
/// does running past the deadline.
pub struct FullScan<'a, S: DataSource> {
    source: &'a S,
    batch_size: usize,
    scan_cap: usize,
    deadline: Duration,
}

impl<'a, S: DataSource> FullScan<'a, S> {
    pub fn new(source: &'a S, batch_size: usize, scan_cap: usize, deadline: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            source,
            batch_size,
            scan_cap: scan_cap.max(batch_size),
            deadline,
        }
    }

    pub async fn run<F>(&self, table: &TableDescriptor, predicates: &[Predicate], visit: F) -> Result<ScanOutcome, EngineError>
    where
        F: FnMut(&Record) + Send,
    {
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.deadline, self.scan(table, predicates, visit))
            .await
            .map_err(|_| {
                error!(
                    "Full scan of {} exceeded its deadline of {:?}",
                    table.name, self.deadline
                );
                EngineError::DeadlineExceeded(self.deadline)
            })??;

        if outcome.truncated {
            warn!(
                "Full scan of {} stopped at the safety cap of {} rows",
                table.name, self.scan_cap
            );
        }

        info!(
            "Scanned {} rows of {} in {:?}",
            outcome.scanned,
            table.name,
            started.elapsed()
        );

        Ok(outcome)
    }

    async fn scan<F>(&self, table: &TableDescriptor, predicates: &[Predicate], mut visit: F) -> Result<ScanOutcome, EngineError>
    where
        F: FnMut(&Record) + Send,
    {
        let ordering = [OrderBy::asc(&table.primary_key)];
        let mut batch_size = self.batch_size;
        let mut offset = 0usize;

        while offset < self.scan_cap {
            let want = batch_size.min(self.scan_cap - offset);

            let batch = self
                .source
                .query(table, predicates, &ordering, want, offset)
                .await
                .inspect_err(|e| {
                    error!("Batch at offset {} of {} failed: {}", offset, table.name, e);
                })?;

            for record in batch.iter().take(want) {
                visit(record);
            }

            let received = batch.len().min(want);
            offset += received;

            if received < want {
                if received == 0 || !self.has_rows_at(table, predicates, &ordering, offset).await? {
                    return Ok(ScanOutcome { scanned: offset as u64, truncated: false });
                }

                warn!(
                    "Source {} returned {} of {} rows from {}; continuing with batches of {}",
                    self.source.get_name(),
                    received,
                    want,
                    table.name,
                    received
                );
                batch_size = received;
            }
        }

        // Exactly `scan_cap` rows is a complete scan, not a truncated one.
        let truncated = self.has_rows_at(table, predicates, &ordering, offset).await?;

        Ok(ScanOutcome { scanned: offset as u64, truncated })
    }

    async fn has_rows_at(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        offset: usize,
    ) -> Result<bool, EngineError> {
        let probe = self
            .source
            .query(table, predicates, ordering, 1, offset)
            .await
            .inspect_err(|e| {
                error!("Probe at offset {} of {} failed: {}", offset, table.name, e);
            })?;

        Ok(!probe.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::SourceError,
        source::{SourceResult, memory::MemorySource},
    };
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> TableDescriptor {
        TableDescriptor::new("sanctions")
    }

    fn source(rows: i64) -> MemorySource {
        let source = MemorySource::with_page_cap(100);
        let records = (1..=rows)
            .map(|id| Record::try_from(json!({"id": id})).unwrap())
            .collect();
        source.insert_table("sanctions", records);
        source
    }

    fn collect_ids(seen: &mut Vec<i64>) -> impl FnMut(&Record) + Send + '_ {
        move |record: &Record| {
            if let Some(id) = record.get_path("id").and_then(Value::as_i64) {
                seen.push(id);
            }
        }
    }

    #[tokio::test]
    async fn test_scan_reads_every_row_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();

        let source = source(250);
        let mut seen = Vec::new();

        let outcome = FullScan::new(&source, 100, 10_000, Duration::from_secs(5))
            .run(&table(), &[], collect_ids(&mut seen))
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome { scanned: 250, truncated: false });
        assert_eq!(seen, (1..=250).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_safety_cap_truncates() {
        let source = source(250);
        let mut seen = Vec::new();

        let outcome = FullScan::new(&source, 100, 150, Duration::from_secs(5))
            .run(&table(), &[], collect_ids(&mut seen))
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome { scanned: 150, truncated: true });
        assert_eq!(seen.len(), 150);
    }

    #[tokio::test]
    async fn test_source_page_cap_below_batch_size_still_reads_everything() {
        let source = source(500);
        let mut seen = Vec::new();

        let outcome = FullScan::new(&source, 1000, 10_000, Duration::from_secs(5))
            .run(&table(), &[], collect_ids(&mut seen))
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome { scanned: 500, truncated: false });
        assert_eq!(seen, (1..=500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_source_page_cap_with_safety_cap_reports_truncation() {
        let source = source(500);

        let outcome = FullScan::new(&source, 1000, 1000, Duration::from_secs(5))
            .run(&table(), &[], |_: &Record| {})
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome { scanned: 500, truncated: false });

        let source = MemorySource::with_page_cap(100);
        source.insert_table(
            "sanctions",
            (1..=1500).map(|id| Record::try_from(json!({"id": id})).unwrap()).collect(),
        );

        let outcome = FullScan::new(&source, 1000, 1000, Duration::from_secs(5))
            .run(&table(), &[], |_: &Record| {})
            .await
            .unwrap();
        assert_eq!(outcome, ScanOutcome { scanned: 1000, truncated: true });
    }

    #[tokio::test]
    async fn test_exact_cap_is_not_truncated() {
        let source = source(200);

        let outcome = FullScan::new(&source, 100, 200, Duration::from_secs(5))
            .run(&table(), &[], |_: &Record| {})
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome { scanned: 200, truncated: false });
    }

    /// Serves one good batch, then fails.
    struct FlakySource {
        inner: MemorySource,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl DataSource for FlakySource {
        async fn query(
            &self,
            table: &TableDescriptor,
            predicates: &[Predicate],
            ordering: &[OrderBy],
            limit: usize,
            offset: usize,
        ) -> SourceResult<Vec<Record>> {
            tokio::time::sleep(self.delay).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(SourceError::Unavailable("connection reset".to_string()));
            }
            self.inner.query(table, predicates, ordering, limit, offset).await
        }

        async fn count(&self, table: &TableDescriptor, predicates: &[Predicate]) -> SourceResult<u64> {
            self.inner.count(table, predicates).await
        }

        fn get_name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_batch_failure_aborts_scan() {
        let source = FlakySource {
            inner: source(250),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        };

        let result = FullScan::new(&source, 100, 10_000, Duration::from_secs(5))
            .run(&table(), &[], |_: &Record| {})
            .await;

        assert!(matches!(result, Err(EngineError::Source(SourceError::Unavailable(_)))));
    }

    #[tokio::test]
    async fn test_deadline_aborts_scan() {
        let source = FlakySource {
            inner: source(250),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        };

        let result = FullScan::new(&source, 100, 10_000, Duration::from_millis(50))
            .run(&table(), &[], |_: &Record| {})
            .await;

        assert!(matches!(result, Err(EngineError::DeadlineExceeded(_))));
    }
}
