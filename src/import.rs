use crate::batch::{batch_count, batches};
use crate::config::{self, ImportConfig};
use crate::error::{ImportError, Result, StoreError};
use crate::models::{Label, RecordSet, RelType};
use crate::schema::RelationshipStep;
use crate::stats::ImportStats;
use crate::store::{EdgeRequest, GraphStore, PropertyMap};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bounded exponential backoff around a single batch write.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
    };

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Everything an import step needs besides the store, built once per run.
pub struct RunContext {
    pub data_dir: PathBuf,
    pub batch_size: NonZeroUsize,
    pub retry: RetryPolicy,
    pub relationship_parallelism: usize,
    pub stats: ImportStats,
    progress: Option<MultiProgress>,
}

impl RunContext {
    pub fn new(data_dir: impl Into<PathBuf>, batch_size: NonZeroUsize) -> Self {
        Self {
            data_dir: data_dir.into(),
            batch_size,
            retry: RetryPolicy {
                max_retries: config::BATCH_MAX_RETRIES,
                base_delay: Duration::from_millis(config::BATCH_RETRY_DELAY_MS),
            },
            relationship_parallelism: config::RELATIONSHIP_PARALLELISM,
            stats: ImportStats::new(),
            progress: None,
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        let mut ctx = Self::new(&config.data_dir, config.batch_size);
        ctx.retry = RetryPolicy {
            max_retries: config.batch_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
        };
        ctx.relationship_parallelism = config.relationship_parallelism.max(1);
        if config.show_progress {
            ctx.progress = Some(MultiProgress::new());
        }
        ctx
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_relationship_parallelism(mut self, parallelism: usize) -> Self {
        self.relationship_parallelism = parallelism.max(1);
        self
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.data_dir.join(path)
    }

    fn progress_bar(&self, total: u64, step: &str) -> ProgressBar {
        let Some(mp) = &self.progress else {
            return ProgressBar::hidden();
        };
        let pb = mp.add(ProgressBar::new(total));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "    {{spinner:.cyan}} {step:<32} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} records"
        )) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

/// What the store holds after a step compared to what the step processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub expected: u64,
    /// `None` when the count query itself failed
    pub actual: Option<u64>,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum VerifyTarget {
    Nodes(Label),
    Edges(RelType),
}

impl std::fmt::Display for VerifyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyTarget::Nodes(label) => write!(f, "{label} nodes"),
            VerifyTarget::Edges(rel) => write!(f, "{rel} relationships"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub file: String,
    pub records: u64,
    /// Nodes or relationships the store reported as created
    pub written: u64,
    pub batches: u64,
    pub verification: Option<Verification>,
    pub elapsed_secs: f64,
}

impl StepReport {
    fn new(step: &str, records: u64) -> Self {
        Self {
            step: step.to_string(),
            file: String::new(),
            records,
            written: 0,
            batches: 0,
            verification: None,
            elapsed_secs: 0.0,
        }
    }
}

/// Counts entities of `target` and compares with `expected`. A mismatch or a failed
/// count is logged, never returned as an error.
pub async fn verify<S: GraphStore + ?Sized>(
    store: &S,
    target: VerifyTarget,
    expected: u64,
) -> Verification {
    let counted = match target {
        VerifyTarget::Nodes(label) => store.count_nodes(label).await,
        VerifyTarget::Edges(rel) => store.count_edges(rel).await,
    };

    match counted {
        Ok(actual) => {
            info!(
                expected,
                actual,
                "Completed: {expected} {target} processed, {actual} found in database"
            );
            if actual != expected {
                warn!(
                    expected,
                    actual,
                    "Store count for {target} does not match source records"
                );
            }
            Verification {
                expected,
                actual: Some(actual),
                ok: actual == expected,
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not count {target} for verification");
            Verification {
                expected,
                actual: None,
                ok: false,
            }
        }
    }
}

/// Runs `op` until it succeeds or the retry budget is spent.
async fn write_with_retry<T, F, Fut>(
    ctx: &RunContext,
    step: &str,
    batch: usize,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, StoreError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt <= ctx.retry.max_retries => {
                let delay = ctx.retry.delay_for(attempt);
                warn!(
                    step,
                    batch,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Batch write failed, retrying"
                );
                ctx.stats.inc_retries();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(ImportError::WriteFailure {
                    step: step.to_string(),
                    batch,
                    attempts: attempt,
                    source,
                })
            }
        }
    }
}

fn log_progress(step: &str, batch: usize, batches: usize, processed: usize, total: usize) {
    if (batch + 1) % config::PROGRESS_EVERY_BATCHES == 0 || batch + 1 == batches {
        let pct = processed as f64 / total as f64 * 100.0;
        info!(
            step,
            processed,
            total,
            "Created {processed}/{total} {step} ({pct:.1}%)"
        );
    }
}

/// Creates one node per record, one store operation per batch.
pub async fn import_nodes<S: GraphStore + ?Sized>(
    ctx: &RunContext,
    store: &S,
    label: Label,
    records: &RecordSet,
) -> Result<StepReport> {
    let step = format!("{label} nodes");
    let started = Instant::now();
    let total = records.len();
    let mut report = StepReport::new(&step, total as u64);

    if records.is_empty() {
        warn!(%label, "No {label} data to insert");
        return Ok(report);
    }

    let batch_total = batch_count(total, ctx.batch_size);
    let pb = ctx.progress_bar(total as u64, &step);
    let mut processed = 0usize;

    for batch in batches(records, ctx.batch_size) {
        let rows: Vec<PropertyMap> = batch
            .records
            .iter()
            .map(|record| {
                records
                    .fields(record)
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect()
            })
            .collect();

        let created = match write_with_retry(ctx, &step, batch.index, || {
            store.create_nodes(label, &rows)
        })
        .await
        {
            Ok(created) => created,
            Err(e) => {
                pb.abandon_with_message(format!("{step}: failed at batch {}", batch.index));
                return Err(e);
            }
        };

        processed += batch.records.len();
        report.written += created;
        report.batches += 1;
        ctx.stats.add_nodes(created);
        ctx.stats.inc_batches();
        pb.inc(batch.records.len() as u64);
        log_progress(&step, batch.index, batch_total, processed, total);
    }
    pb.finish_with_message(format!("{step}: {processed} records"));

    let verification = verify(store, VerifyTarget::Nodes(label), total as u64).await;
    if !verification.ok {
        ctx.stats.inc_mismatches();
    }
    report.verification = Some(verification);
    report.elapsed_secs = started.elapsed().as_secs_f64();
    Ok(report)
}

/// Column positions a relationship step reads from its record set.
struct EdgeColumns {
    start: usize,
    end: usize,
    properties: Vec<(&'static str, usize)>,
}

fn edge_columns(step: &RelationshipStep, records: &RecordSet, path: &Path) -> Result<EdgeColumns> {
    let require = |field: &str| {
        records.column_index(field).ok_or_else(|| {
            ImportError::malformed(path, None, format!("missing identifier column '{field}'"))
        })
    };
    let start = require(step.start_id_field)?;
    let end = require(step.end_id_field)?;

    let properties = step
        .properties
        .iter()
        .filter_map(|&(property, field)| match records.column_index(field) {
            Some(idx) => Some((property, idx)),
            None => {
                debug!(property, field, "Projected field not in source, never written");
                None
            }
        })
        .collect();

    Ok(EdgeColumns {
        start,
        end,
        properties,
    })
}

/// Builds the write request for the record at `position` of its record set. Identifier
/// fields must narrow to integers; empty property values are left out.
fn edge_request(
    columns: &EdgeColumns,
    records: &RecordSet,
    position: usize,
    seq: usize,
    path: &Path,
) -> Result<EdgeRequest> {
    let record = &records.records[position];
    let line = record.line;
    let id_at = |idx: usize| {
        let value = &record.values[idx];
        value.as_id().ok_or_else(|| {
            ImportError::malformed(
                path,
                line,
                format!(
                    "'{}' is not an integer identifier in column '{}'",
                    value, records.columns[idx]
                ),
            )
        })
    };

    Ok(EdgeRequest {
        seq,
        start_id: id_at(columns.start)?,
        end_id: id_at(columns.end)?,
        properties: columns
            .properties
            .iter()
            .filter(|(_, idx)| !record.values[*idx].is_empty())
            .map(|&(property, idx)| (property.to_string(), record.values[idx].clone()))
            .collect(),
    })
}

/// Creates one relationship per record whose endpoints resolve to exactly one node each.
/// `path` is only used to describe malformed rows.
pub async fn import_relationships<S: GraphStore + ?Sized>(
    ctx: &RunContext,
    store: &S,
    step: &RelationshipStep,
    records: &RecordSet,
    path: &Path,
) -> Result<StepReport> {
    let name = step.pattern.to_string();
    let rel = step.pattern.rel;
    let started = Instant::now();
    let total = records.len();
    let mut report = StepReport::new(&name, total as u64);

    if records.is_empty() {
        warn!(%rel, "No {rel} relationship data to insert");
        return Ok(report);
    }

    let columns = edge_columns(step, records, path)?;
    let batch_total = batch_count(total, ctx.batch_size);
    let pb = ctx.progress_bar(total as u64, &name);
    let mut processed = 0usize;

    for batch in batches(records, ctx.batch_size) {
        let offset = batch.index * ctx.batch_size.get();
        let requests = (0..batch.records.len())
            .map(|seq| edge_request(&columns, records, offset + seq, seq, path))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|_| pb.abandon())?;

        let created = match write_with_retry(ctx, &name, batch.index, || {
            store.create_edges(step.pattern, &requests)
        })
        .await
        {
            Ok(created) => created,
            Err(e) => {
                pb.abandon_with_message(format!("{name}: failed at batch {}", batch.index));
                return Err(e);
            }
        };

        let requested = batch.records.len() as u64;
        if created < requested {
            debug!(
                step = %name,
                batch = batch.index,
                skipped = requested - created,
                "Requests without a unique start and end node were skipped"
            );
        }

        processed += batch.records.len();
        report.written += created;
        report.batches += 1;
        ctx.stats.add_edges(requested, created);
        ctx.stats.inc_batches();
        pb.inc(requested);
        log_progress(&name, batch.index, batch_total, processed, total);
    }
    pb.finish_with_message(format!("{name}: {processed} records"));

    let verification = verify(store, VerifyTarget::Edges(rel), total as u64).await;
    if !verification.ok {
        ctx.stats.inc_mismatches();
    }
    report.verification = Some(verification);
    report.elapsed_secs = started.elapsed().as_secs_f64();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraph;
    use crate::models::{Record, Value};
    use crate::schema::SourceFile;
    use crate::source::LoadOptions;
    use crate::store::EdgePattern;

    fn ctx(batch_size: usize) -> RunContext {
        RunContext::new(".", NonZeroUsize::new(batch_size).unwrap()).with_retry(RetryPolicy::NONE)
    }

    fn people(ids: &[i64]) -> RecordSet {
        RecordSet::new(
            vec!["id".into(), "firstName".into()],
            ids.iter()
                .map(|&id| Record::new(vec![Value::Int(id), Value::Str(format!("p{id}"))]))
                .collect(),
        )
    }

    fn knows_step() -> RelationshipStep {
        RelationshipStep {
            pattern: EdgePattern {
                start: Label::Person,
                rel: RelType::Knows,
                end: Label::Person,
            },
            source: SourceFile {
                path: "knows.csv",
                options: LoadOptions::default(),
            },
            start_id_field: "personto",
            end_id_field: "personfrom",
            properties: &[("creationDate", "creationDate"), ("weight", "weight")],
        }
    }

    fn knows(rows: &[(Value, Value, Value)]) -> RecordSet {
        RecordSet::new(
            vec!["personto".into(), "personfrom".into(), "creationDate".into()],
            rows.iter()
                .map(|(a, b, c)| Record::new(vec![a.clone(), b.clone(), c.clone()]))
                .collect(),
        )
    }

    #[tokio::test]
    async fn nodes_are_written_in_batches() {
        let ctx = ctx(2);
        let graph = MemoryGraph::new();
        let report = import_nodes(&ctx, &graph, Label::Person, &people(&[1, 2, 3, 4, 5]))
            .await
            .unwrap();

        assert_eq!(report.records, 5);
        assert_eq!(report.written, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(
            report.verification,
            Some(Verification {
                expected: 5,
                actual: Some(5),
                ok: true
            })
        );
        assert_eq!(ctx.stats.batches(), 3);
        let stored = graph.nodes(Label::Person);
        assert_eq!(stored[4].property("firstName"), Some(&Value::Str("p5".into())));
    }

    #[tokio::test]
    async fn empty_node_set_is_a_noop() {
        let ctx = ctx(10);
        let graph = MemoryGraph::new();
        let report = import_nodes(&ctx, &graph, Label::Tag, &RecordSet::default())
            .await
            .unwrap();
        assert_eq!(report.batches, 0);
        assert!(report.verification.is_none());
        assert_eq!(graph.node_count(), 0);
    }

    #[tokio::test]
    async fn empty_marker_is_never_a_relationship_property() {
        let ctx = ctx(10);
        let graph = MemoryGraph::new();
        import_nodes(&ctx, &graph, Label::Person, &people(&[1, 2, 3]))
            .await
            .unwrap();

        let records = knows(&[
            (Value::Int(1), Value::Int(2), Value::Str("2010-01-01T00:00:00".into())),
            (Value::Int(2), Value::Int(3), Value::Empty),
        ]);
        let report = import_relationships(&ctx, &graph, &knows_step(), &records, Path::new("knows.csv"))
            .await
            .unwrap();
        assert_eq!(report.written, 2);

        let edges = graph.edges(RelType::Knows);
        assert_eq!(edges[0].2.len(), 1);
        assert_eq!(edges[0].2[0].0, "creationDate");
        assert!(edges[1].2.is_empty());
    }

    #[tokio::test]
    async fn unresolved_endpoints_are_skipped_not_failed() {
        let ctx = ctx(1);
        let graph = MemoryGraph::new();
        import_nodes(&ctx, &graph, Label::Person, &people(&[1, 2]))
            .await
            .unwrap();

        let records = knows(&[
            (Value::Int(1), Value::Int(2), Value::Empty),
            (Value::Int(2), Value::Int(3), Value::Empty),
        ]);
        let report = import_relationships(&ctx, &graph, &knows_step(), &records, Path::new("knows.csv"))
            .await
            .unwrap();

        assert_eq!(report.written, 1);
        let verification = report.verification.unwrap();
        assert_eq!(verification.actual, Some(1));
        assert!(!verification.ok);
        assert_eq!(ctx.stats.edge_requests(), 2);
        assert_eq!(ctx.stats.mismatches(), 1);
    }

    #[tokio::test]
    async fn string_ids_are_narrowed() {
        let ctx = ctx(10);
        let graph = MemoryGraph::new();
        import_nodes(&ctx, &graph, Label::Person, &people(&[7, 8]))
            .await
            .unwrap();

        let records = knows(&[(Value::Str("7".into()), Value::Str("8".into()), Value::Empty)]);
        let report = import_relationships(&ctx, &graph, &knows_step(), &records, Path::new("knows.csv"))
            .await
            .unwrap();
        assert_eq!(report.written, 1);
    }

    #[tokio::test]
    async fn non_integer_id_is_malformed() {
        let ctx = ctx(10);
        let graph = MemoryGraph::new();
        let mut records = knows(&[
            (Value::Int(1), Value::Int(2), Value::Empty),
            (Value::Int(1), Value::Empty, Value::Empty),
        ]);
        records.records[1].line = Some(5);
        let err = import_relationships(&ctx, &graph, &knows_step(), &records, Path::new("knows.csv"))
            .await
            .unwrap_err();
        match err {
            ImportError::MalformedInput { line, .. } => assert_eq!(line, Some(5)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_identifier_column_is_malformed() {
        let ctx = ctx(10);
        let graph = MemoryGraph::new();
        let records = RecordSet::new(
            vec!["personid".into()],
            vec![Record::new(vec![Value::Int(1)])],
        );
        let err = import_relationships(&ctx, &graph, &knows_step(), &records, Path::new("knows.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing identifier column 'personto'"));
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let ctx = RunContext::new(".", NonZeroUsize::MIN).with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        });
        let mut calls = 0;
        let value = write_with_retry(&ctx, "step", 0, || {
            calls += 1;
            let fail = calls == 1;
            async move {
                if fail {
                    Err(StoreError::Rejected("transient".into()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(ctx.stats.retries(), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let ctx = RunContext::new(".", NonZeroUsize::MIN).with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        });
        let err = write_with_retry(&ctx, "Tag nodes", 4, || async {
            Err::<u64, _>(StoreError::Rejected("down".into()))
        })
        .await
        .unwrap_err();
        match err {
            ImportError::WriteFailure {
                step,
                batch,
                attempts,
                ..
            } => {
                assert_eq!(step, "Tag nodes");
                assert_eq!(batch, 4);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.stats.retries(), 2);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }
}
