//! Drives a full reload: clear the store, create indices, load every node step, then
//! every relationship step. The first failing step aborts the run.

use crate::config::ImportConfig;
use crate::error::{ImportError, StoreError};
use crate::import::{import_nodes, import_relationships, RunContext, StepReport};
use crate::memory::MemoryGraph;
use crate::models::ID_PROPERTY;
use crate::neo4j::Neo4jStore;
use crate::schema::{self, ImportStep, NodeStep, RelationshipStep};
use crate::source;
use crate::stats::StatsSnapshot;
use crate::store::GraphStore;
use anyhow::Context;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::error::Error as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Connected,
    Cleared,
    IndicesReady,
    NodesLoading,
    RelationshipsLoading,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub file: Option<String>,
    pub kind: &'static str,
    pub error: String,
}

impl StepFailure {
    fn new(step: impl Into<String>, file: Option<&Path>, err: &ImportError) -> Self {
        let step = step.into();
        let file = file.map(|p| p.display().to_string());
        let message = error_chain(err);
        error!(
            step = %step,
            file = file.as_deref().unwrap_or("-"),
            kind = err.kind(),
            "Import step failed: {message}"
        );
        Self {
            step,
            file,
            kind: err.kind(),
            error: message,
        }
    }
}

fn error_chain(err: &ImportError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub steps: Vec<StepReport>,
    pub failure: Option<StepFailure>,
    pub stats: StatsSnapshot,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }
}

pub struct Orchestrator<'a, S: GraphStore + ?Sized> {
    ctx: &'a RunContext,
    store: &'a S,
    state: RunState,
    steps: Vec<StepReport>,
}

impl<'a, S: GraphStore + ?Sized> Orchestrator<'a, S> {
    pub fn new(ctx: &'a RunContext, store: &'a S) -> Self {
        Self {
            ctx,
            store,
            state: RunState::Idle,
            steps: Vec::new(),
        }
    }

    fn advance(&mut self, next: RunState) {
        info!(from = ?self.state, to = ?next, "Import state changed");
        self.state = next;
    }

    /// Runs `plan` to completion or to the first failure. Holding a store handle
    /// means the connection is already established.
    pub async fn run(mut self, plan: &[ImportStep]) -> RunReport {
        let started = Instant::now();
        let failure = match self.drive(plan).await {
            Ok(()) => None,
            Err(failure) => {
                self.advance(RunState::Aborted);
                Some(failure)
            }
        };

        RunReport {
            state: self.state,
            steps: self.steps,
            failure,
            stats: self.ctx.stats.snapshot(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    async fn drive(&mut self, plan: &[ImportStep]) -> Result<(), StepFailure> {
        self.advance(RunState::Connected);

        schema::validate(plan).map_err(|e| StepFailure::new("validate plan", None, &e))?;

        self.clear().await?;
        self.advance(RunState::Cleared);

        self.create_indices(plan).await?;
        self.advance(RunState::IndicesReady);

        self.advance(RunState::NodesLoading);
        for step in plan {
            if let ImportStep::Nodes(node_step) = step {
                let report = run_node_step(self.ctx, self.store, node_step).await?;
                self.steps.push(report);
            }
        }

        self.advance(RunState::RelationshipsLoading);
        let relationship_steps: Vec<&RelationshipStep> = plan
            .iter()
            .filter_map(|step| match step {
                ImportStep::Relationships(r) => Some(r),
                ImportStep::Nodes(_) => None,
            })
            .collect();

        if self.ctx.relationship_parallelism > 1 {
            self.run_relationships_concurrently(&relationship_steps).await?;
        } else {
            for step in relationship_steps {
                let report = run_relationship_step(self.ctx, self.store, step).await?;
                self.steps.push(report);
            }
        }

        self.advance(RunState::Done);
        Ok(())
    }

    /// Relationships first, so no node is deleted while an edge still references it.
    async fn clear(&self) -> Result<(), StepFailure> {
        let started = Instant::now();
        let store_failure = |operation: &str, source: StoreError| {
            let err = ImportError::Store {
                operation: operation.to_string(),
                source,
            };
            StepFailure::new("clear store", None, &err)
        };
        self.store
            .delete_all_edges()
            .await
            .map_err(|e| store_failure("deleting relationships", e))?;
        self.store
            .delete_all_nodes()
            .await
            .map_err(|e| store_failure("deleting nodes", e))?;
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Cleared database"
        );
        Ok(())
    }

    async fn create_indices(&self, plan: &[ImportStep]) -> Result<(), StepFailure> {
        for label in schema::node_labels(plan) {
            self.store
                .ensure_index(label, ID_PROPERTY)
                .await
                .map_err(|source| {
                    let err = ImportError::Store {
                        operation: format!("creating index on {label}.{ID_PROPERTY}"),
                        source,
                    };
                    StepFailure::new("create indices", None, &err)
                })?;
        }
        info!("Indices ready");
        Ok(())
    }

    /// Keeps up to `relationship_parallelism` steps in flight. After a failure nothing
    /// new is scheduled; steps already running are awaited before the run aborts.
    async fn run_relationships_concurrently(
        &mut self,
        steps: &[&RelationshipStep],
    ) -> Result<(), StepFailure> {
        let ctx = self.ctx;
        let store = self.store;
        let mut pending = steps.iter();
        let mut in_flight = FuturesUnordered::new();
        let mut failure = None;

        for step in pending.by_ref().take(ctx.relationship_parallelism) {
            in_flight.push(run_relationship_step(ctx, store, step));
        }

        while let Some(result) = in_flight.next().await {
            match result {
                Ok(report) => self.steps.push(report),
                Err(f) => {
                    if failure.is_none() {
                        failure = Some(f);
                    }
                }
            }
            if failure.is_none() {
                if let Some(step) = pending.next() {
                    in_flight.push(run_relationship_step(ctx, store, step));
                }
            }
        }

        match failure {
            Some(f) => Err(f),
            None => Ok(()),
        }
    }
}

async fn run_node_step<S: GraphStore + ?Sized>(
    ctx: &RunContext,
    store: &S,
    step: &NodeStep,
) -> Result<StepReport, StepFailure> {
    let name = format!("{} nodes", step.label);
    let path = ctx.resolve(step.source.path);
    let result: Result<StepReport, ImportError> = async {
        let records = source::load(&path, &step.source.options)?;
        ctx.stats.add_loaded(records.len() as u64);
        import_nodes(ctx, store, step.label, &records).await
    }
    .await;

    match result {
        Ok(mut report) => {
            report.file = path.display().to_string();
            Ok(report)
        }
        Err(e) => Err(StepFailure::new(name, Some(&path), &e)),
    }
}

async fn run_relationship_step<S: GraphStore + ?Sized>(
    ctx: &RunContext,
    store: &S,
    step: &RelationshipStep,
) -> Result<StepReport, StepFailure> {
    let name = step.pattern.to_string();
    let path = ctx.resolve(step.source.path);
    let result: Result<StepReport, ImportError> = async {
        let records = source::load(&path, &step.source.options)?;
        ctx.stats.add_loaded(records.len() as u64);
        import_relationships(ctx, store, step, &records, &path).await
    }
    .await;

    match result {
        Ok(mut report) => {
            report.file = path.display().to_string();
            Ok(report)
        }
        Err(e) => Err(StepFailure::new(name, Some(&path), &e)),
    }
}

/// Connects (or builds an in-process graph for a dry run), runs the LDBC plan and
/// writes the optional JSON report. The store is dropped before this returns.
pub async fn run_import(config: &ImportConfig) -> anyhow::Result<RunReport> {
    let ctx = RunContext::from_config(config);
    let plan = schema::ldbc_plan();

    let report = if config.dry_run {
        info!("Dry run: loading into an in-process graph");
        let store = MemoryGraph::new();
        Orchestrator::new(&ctx, &store).run(&plan).await
    } else {
        match Neo4jStore::connect(&config.bolt_uri, &config.user, &config.password).await {
            Ok(store) => Orchestrator::new(&ctx, &store).run(&plan).await,
            Err(e) => RunReport {
                state: RunState::Aborted,
                steps: Vec::new(),
                failure: Some(StepFailure::new("connect", None, &e)),
                stats: ctx.stats.snapshot(),
                elapsed_secs: 0.0,
            },
        }
    };

    if let Some(path) = &config.report_path {
        write_report(path, &report)?;
    }
    Ok(report)
}

pub fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    info!(path = %path.display(), "Wrote run report");
    Ok(())
}
