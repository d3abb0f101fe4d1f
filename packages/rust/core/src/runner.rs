//! One tick of a job: fetch, decode, transform, validate, dispatch.
//!
//! A tick either produces a [`RunReport`] or aborts with the error of the
//! phase that failed. Nothing is dispatched after an abort, and the next tick
//! starts from scratch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use harvester_destinations::Dispatcher;
use harvester_shared::{
    HarvesterError, InputSource, JobConfig, META_JOB_KEY, META_TIMESTAMP_KEY, OutputConfig,
    RequestConfig, Result,
};
use harvester_transform::{SoftMiss, apply_chain};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::fetch::{HttpFetcher, decode, resolve_kind};

// ---------------------------------------------------------------------------
// Phases and reports
// ---------------------------------------------------------------------------

/// Where a tick is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Fetching,
    Detecting,
    Transforming,
    Validating,
    Dispatching,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Detecting => "detecting",
            Self::Transforming => "transforming",
            Self::Validating => "validating",
            Self::Dispatching => "dispatching",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of delivering the payload to one output.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Position of the output in the job's `outputs` list.
    pub index: usize,
    pub destination: String,
    pub success: bool,
    /// Chain failure or timeout; destination errors are only logged.
    pub error: Option<String>,
    pub misses: Vec<SoftMiss>,
}

/// Summary of a completed tick.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job: String,
    /// Input payload after the input chain and metadata injection.
    pub payload: Value,
    pub input_misses: Vec<SoftMiss>,
    pub outputs: Vec<DispatchOutcome>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn all_delivered(&self) -> bool {
        self.outputs.iter().all(|o| o.success)
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A configured job bound to its fetcher and dispatcher.
pub struct Job {
    name: String,
    config: JobConfig,
    fetcher: HttpFetcher,
    dispatcher: Arc<Dispatcher>,
    dispatch_timeout: Duration,
    gate: Mutex<()>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        config: JobConfig,
        fetcher: HttpFetcher,
        dispatcher: Arc<Dispatcher>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            fetcher,
            dispatcher,
            dispatch_timeout,
            gate: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run a tick unless one is already in flight, in which case `None`.
    pub async fn try_run(&self) -> Option<Result<RunReport>> {
        let _guard = self.gate.try_lock().ok()?;
        Some(self.execute().await)
    }

    /// Run a tick, waiting for an in-flight one to finish first.
    pub async fn run(&self) -> Result<RunReport> {
        let _guard = self.gate.lock().await;
        self.execute().await
    }

    async fn execute(&self) -> Result<RunReport> {
        let run_id = Uuid::now_v7();
        let span = info_span!("job", job = %self.name, run_id = %run_id);

        async move {
            let start = Instant::now();
            let mut phase = RunPhase::Idle;

            match self.tick(run_id, &mut phase).await {
                Ok(mut report) => {
                    report.elapsed = start.elapsed();
                    info!(
                        outputs = report.outputs.len(),
                        delivered = report.outputs.iter().filter(|o| o.success).count(),
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "tick completed"
                    );
                    Ok(report)
                }
                Err(e) => {
                    error!(phase = %phase, error = %e, "tick aborted");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn tick(&self, run_id: Uuid, phase: &mut RunPhase) -> Result<RunReport> {
        let started_ms = Utc::now().timestamp_millis();

        let raw = self.fetch_input(phase).await?;

        *phase = RunPhase::Transforming;
        let scope = format!("jobs.{}.input", self.name);
        let chained = apply_chain(&scope, &self.config.input.transforms, &raw)?;

        *phase = RunPhase::Validating;
        let mut payload = chained.value;
        if !(payload.is_object() || payload.is_array()) {
            return Err(HarvesterError::validation(format!(
                "input payload must be an object or an array after transformations, got {}",
                kind_name(&payload)
            )));
        }
        inject_metadata(&mut payload, started_ms, &self.name);

        *phase = RunPhase::Dispatching;
        let outputs = self.dispatch(Arc::new(payload.clone())).await;

        Ok(RunReport {
            run_id,
            job: self.name.clone(),
            payload,
            input_misses: chained.misses,
            outputs,
            elapsed: Duration::ZERO,
        })
    }

    async fn fetch_input(&self, phase: &mut RunPhase) -> Result<Value> {
        let configured = self.config.input.content_type;

        match self.config.input.source()? {
            InputSource::Single(request) => {
                *phase = RunPhase::Fetching;
                let fetched = self.fetcher.fetch(request).await?;
                *phase = RunPhase::Detecting;
                let kind = resolve_kind(configured, &fetched)?;
                debug!(kind = %kind, "payload kind");
                decode(kind, fetched.body)
            }
            InputSource::Merge(merge) => {
                *phase = RunPhase::Fetching;
                let fetched = try_join_all(
                    merge
                        .requests
                        .iter()
                        .map(|request: &RequestConfig| self.fetcher.fetch(request)),
                )
                .await?;

                *phase = RunPhase::Detecting;
                let scope = format!("jobs.{}.input.merge", self.name);
                let mut parts = Vec::with_capacity(fetched.len());
                for result in fetched {
                    let kind = resolve_kind(configured, &result)?;
                    let value = decode(kind, result.body)?;
                    parts.push(apply_chain(&scope, &merge.transforms, &value)?.value);
                }
                join_merged(parts)
            }
        }
    }

    /// One spawned task per output; each destination write is bounded by the dispatch timeout.
    async fn dispatch(&self, payload: Arc<Value>) -> Vec<DispatchOutcome> {
        let handles: Vec<_> = self
            .config
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                let task = deliver(
                    index,
                    self.name.clone(),
                    output.clone(),
                    payload.clone(),
                    self.dispatcher.clone(),
                    self.dispatch_timeout,
                );
                (index, output.to.clone(), tokio::spawn(task.in_current_span()))
            })
            .collect();

        let (meta, tasks): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(index, to, handle)| ((index, to), handle))
            .unzip();

        join_all(tasks)
            .await
            .into_iter()
            .zip(meta)
            .map(|(joined, (index, destination))| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(output = index, destination = %destination, error = %e, "output task failed");
                    DispatchOutcome {
                        index,
                        destination,
                        success: false,
                        error: Some(e.to_string()),
                        misses: Vec::new(),
                    }
                }
            })
            .collect()
    }
}

async fn deliver(
    index: usize,
    job: String,
    output: OutputConfig,
    payload: Arc<Value>,
    dispatcher: Arc<Dispatcher>,
    timeout: Duration,
) -> DispatchOutcome {
    let scope = format!("jobs.{job}.outputs[{index}]");
    let mut outcome = DispatchOutcome {
        index,
        destination: output.to.clone(),
        success: false,
        error: None,
        misses: Vec::new(),
    };

    let chained = match apply_chain(&scope, &output.transforms, &payload) {
        Ok(chained) => chained,
        Err(e) => {
            error!(output = index, destination = %output.to, error = %e, "output chain failed, output skipped");
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };
    outcome.misses = chained.misses;

    let write = dispatcher.write(&output.to, &job, &chained.value, &output.options);
    match tokio::time::timeout(timeout, write).await {
        Ok(success) => outcome.success = success,
        Err(_) => {
            warn!(
                output = index,
                destination = %output.to,
                timeout_ms = timeout.as_millis() as u64,
                "output write timed out"
            );
            outcome.error = Some(format!("write timed out after {timeout:?}"));
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Join merged fetch results: arrays concatenate, objects shallow-merge.
pub fn join_merged(parts: Vec<Value>) -> Result<Value> {
    if parts.is_empty() {
        return Err(HarvesterError::merge_shape("no results to merge"));
    }

    if parts.iter().all(Value::is_array) {
        let items = parts
            .into_iter()
            .flat_map(|part| match part {
                Value::Array(items) => items,
                _ => Vec::new(),
            })
            .collect();
        return Ok(Value::Array(items));
    }

    if parts.iter().all(Value::is_object) {
        let mut merged = Map::new();
        for part in parts {
            if let Value::Object(map) = part {
                merged.extend(map);
            }
        }
        return Ok(Value::Object(merged));
    }

    let shapes: Vec<&str> = parts.iter().map(kind_name).collect();
    Err(HarvesterError::merge_shape(format!(
        "results must be all arrays or all objects, got [{}]",
        shapes.join(", ")
    )))
}

/// Add the run timestamp and job name to object payloads.
pub fn inject_metadata(payload: &mut Value, timestamp_ms: i64, job: &str) {
    if let Value::Object(map) = payload {
        map.insert(META_TIMESTAMP_KEY.into(), Value::from(timestamp_ms));
        map.insert(META_JOB_KEY.into(), Value::String(job.to_string()));
    }
}

fn kind_name(value: &Value) -> &'static str {
    harvester_transform::value::kind_of(value)
}
