//! Migration pipeline orchestration.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{error, info, warn};

use crate::batch::{BatchAccumulator, BulkResult, ItemFailure};
use crate::config::MigrationSpec;
use crate::error::{Error, Result, RunFailure};
use crate::mapping::MappingReconciler;
use crate::scroll::ScrollCursor;
use crate::store::DocumentStore;
use crate::transform::Transform;

/// Migration statistics.
#[derive(Debug, Default, Clone)]
pub struct MigrationStats {
    /// Source documents read.
    pub docs_read: u64,
    /// Target documents the store applied.
    pub docs_written: u64,
    /// Source documents the transform dropped.
    pub docs_skipped: u64,
    /// Write operations produced by the transform.
    pub ops_produced: u64,
    /// Bulk calls made.
    pub batches_flushed: u64,
    /// Items the target refused, in batch order.
    pub errors: Vec<ItemFailure>,
    /// Wall-clock start of the run.
    pub started_at: Option<SystemTime>,
    /// Wall-clock end of the run, successful or not.
    pub finished_at: Option<SystemTime>,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Peak resident memory of the process, where the platform reports it.
    pub peak_memory_bytes: Option<u64>,
}

impl MigrationStats {
    /// Calculate throughput (documents written per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.docs_written as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Whether every produced operation was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turns rejected items into an error, for callers that need all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BulkWrite`] listing every rejected item.
    pub fn ensure_clean(&self) -> Result<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(Error::BulkWrite(self.errors.clone()))
        }
    }

    fn record(&mut self, result: BulkResult) {
        self.batches_flushed += 1;
        self.docs_written += result.applied;
        self.errors.extend(result.failures);
    }
}

/// Migration pipeline.
///
/// Source and target are separate handles; passing the same `Arc` twice
/// migrates within one store.
pub struct Pipeline {
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn DocumentStore>,
    spec: MigrationSpec,
    show_progress: bool,
}

impl Pipeline {
    /// Create a new migration pipeline.
    pub fn new(
        source: Arc<dyn DocumentStore>,
        target: Arc<dyn DocumentStore>,
        spec: MigrationSpec,
    ) -> Self {
        Self {
            source,
            target,
            spec,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while running.
    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// The migration this pipeline runs.
    #[must_use]
    pub fn spec(&self) -> &MigrationSpec {
        &self.spec
    }

    /// Run the migration, applying `transform` to every source document.
    ///
    /// Rejected bulk items do not fail the run; they are listed in
    /// [`MigrationStats::errors`].
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] carrying the fatal error and the statistics
    /// gathered up to that point.
    pub async fn run<T>(&self, transform: &mut T) -> std::result::Result<MigrationStats, RunFailure>
    where
        T: Transform + ?Sized,
    {
        let start = Instant::now();
        let mut stats = MigrationStats {
            started_at: Some(SystemTime::now()),
            ..Default::default()
        };

        info!(
            source = %self.spec.source.collection,
            target = %self.spec.target.collection,
            source_store = self.source.kind(),
            target_store = self.target.kind(),
            "Starting migration pipeline"
        );

        let outcome = self.execute(transform, &mut stats).await;

        stats.finished_at = Some(SystemTime::now());
        stats.duration_secs = start.elapsed().as_secs_f64();
        stats.peak_memory_bytes = peak_memory_bytes();

        match outcome {
            Ok(()) => {
                info!(
                    docs_read = stats.docs_read,
                    docs_written = stats.docs_written,
                    docs_skipped = stats.docs_skipped,
                    batches = stats.batches_flushed,
                    errors = stats.errors.len(),
                    "Migration complete in {:.2}s ({:.0} docs/sec)",
                    stats.duration_secs,
                    stats.throughput()
                );
                if !stats.is_clean() {
                    warn!(
                        errors = stats.errors.len(),
                        "Some documents were rejected by the target"
                    );
                }
                Ok(stats)
            }
            Err(source) => {
                error!(
                    code = source.code(),
                    docs_read = stats.docs_read,
                    docs_written = stats.docs_written,
                    "Migration aborted: {}",
                    source
                );
                Err(RunFailure { source, stats })
            }
        }
    }

    async fn execute<T>(&self, transform: &mut T, stats: &mut MigrationStats) -> Result<()>
    where
        T: Transform + ?Sized,
    {
        self.spec.validate()?;

        let target = self.target.as_ref();
        if !target.collection_exists(&self.spec.target.collection).await? {
            return Err(Error::TargetMissing(self.spec.target.collection.clone()));
        }

        MappingReconciler::new(self.source.as_ref(), target)
            .reconcile(&self.spec)
            .await?;

        let mut cursor = ScrollCursor::new(self.source.as_ref(), &self.spec);
        cursor.open().await?;

        let copied = self.copy_pages(&mut cursor, transform, stats).await;
        if copied.is_err() {
            cursor.close().await;
        }
        copied
    }

    async fn copy_pages<T>(
        &self,
        cursor: &mut ScrollCursor<'_>,
        transform: &mut T,
        stats: &mut MigrationStats,
    ) -> Result<()>
    where
        T: Transform + ?Sized,
    {
        let target = self.target.as_ref();
        let progress = self.progress_bar(cursor.total());

        let mut batches = BatchAccumulator::new(self.spec.target.clone(), &self.spec.bulk);
        let flush_per_page = self.spec.bulk.max_batch_size.is_none();

        loop {
            let page = cursor.next_page().await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.records.len() as u64;

            for record in page.records {
                stats.docs_read += 1;
                let id = record.id.clone();
                let result = transform
                    .apply(record)
                    .map_err(|e| Error::transform(id.as_str(), &e))?;
                if result.op_count() == 0 {
                    stats.docs_skipped += 1;
                }
                stats.ops_produced += batches.add(result, &id) as u64;

                while let Some(result) = batches.flush(target).await? {
                    stats.record(result);
                }
            }

            if !page.has_more || flush_per_page {
                for result in batches.flush_remainder(target).await? {
                    stats.record(result);
                }
            }
            progress.inc(fetched);
        }

        for result in batches.flush_remainder(target).await? {
            stats.record(result);
        }
        progress.finish_with_message("Migration complete");

        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        create_progress_bar(total.unwrap_or(0))
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} docs ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

/// Reads `VmHWM` from `/proc/self/status` (Linux only).
fn peak_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_hwm(&status)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_hwm(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let kb: u64 = line
        .trim_start_matches("VmHWM:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kb.saturating_mul(1024))
}
