//! Resumable batch worker.
//!
//! Drives a per-item task across a dataset with durable checkpointing, so a
//! crash or an externally imposed quota never loses completed work. The state
//! machine owns a [`RunState`] and is the only writer; storage is behind a
//! trait so tests (or an object store) can swap the backend.
//!
//! Two failure policies, deliberately distinct:
//! - a rate-limit signal pauses for a long while and retries the *same* index;
//! - any other per-item failure is logged and skipped, and the loop advances.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::Question;
use crate::gateway::{
    Attribution, ChatRequest, CompletionGateway, Message, ModelTier, ProviderError,
};
use crate::prompts;
use crate::solvers::stem;

/// Default pause after a rate-limit signal (one hour).
pub const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(3600);

// =============================================================================
// Records and state
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    pub qid: String,
    pub answer: char,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplanationRecord {
    pub qid: String,
    pub question: String,
    pub choices: Vec<String>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyRecord {
    pub qid: String,
    pub inference_time_sec: f64,
}

/// Full run state: the checkpoint index plus every accumulated artifact.
/// Loaded once at start, rewritten after every processed item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub next_index: usize,
    pub answers: Vec<AnswerRecord>,
    pub explanations: Vec<ExplanationRecord>,
    pub latencies: Vec<LatencyRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt run state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// =============================================================================
// Storage
// =============================================================================

/// Durable storage for a run. `persist` must rewrite the full accumulated
/// state, not append, and must write the checkpoint index last so a crash
/// mid-persist re-runs the item instead of losing its artifacts.
pub trait RunStorage: Send + Sync {
    fn load(&self) -> Result<RunState, WorkerError>;
    fn persist(&self, state: &RunState) -> Result<(), WorkerError>;
}

/// Filesystem storage: five artifact files in one directory.
///
/// `answers.json`, `explanations.json` — accumulated JSON arrays;
/// `inference_time.csv`, `answers.csv` — CSV mirrors;
/// `progress.txt` — the single checkpoint integer, written last.
pub struct FsRunStorage {
    dir: PathBuf,
}

impl FsRunStorage {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, WorkerError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn load_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Vec<T>, WorkerError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn load_latencies(&self) -> Result<Vec<LatencyRecord>, WorkerError> {
        let path = self.path("inference_time.csv");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let mut records = Vec::new();
        for line in raw.lines().skip(1) {
            if let Some((qid, secs)) = line.split_once(',') {
                if let Ok(inference_time_sec) = secs.trim().parse() {
                    records.push(LatencyRecord {
                        qid: qid.to_string(),
                        inference_time_sec,
                    });
                }
            }
        }
        Ok(records)
    }
}

impl RunStorage for FsRunStorage {
    fn load(&self) -> Result<RunState, WorkerError> {
        let progress_path = self.path("progress.txt");
        let next_index = if progress_path.exists() {
            std::fs::read_to_string(progress_path)?
                .trim()
                .parse()
                .unwrap_or(0)
        } else {
            0
        };

        Ok(RunState {
            next_index,
            answers: self.load_json("answers.json")?,
            explanations: self.load_json("explanations.json")?,
            latencies: self.load_latencies()?,
        })
    }

    fn persist(&self, state: &RunState) -> Result<(), WorkerError> {
        use std::io::Write;

        std::fs::write(
            self.path("answers.json"),
            serde_json::to_string_pretty(&state.answers)?,
        )?;
        std::fs::write(
            self.path("explanations.json"),
            serde_json::to_string_pretty(&state.explanations)?,
        )?;

        let mut csv = std::fs::File::create(self.path("answers.csv"))?;
        writeln!(csv, "qid,answer")?;
        for rec in &state.answers {
            writeln!(csv, "{},{}", rec.qid, rec.answer)?;
        }

        let mut csv = std::fs::File::create(self.path("inference_time.csv"))?;
        writeln!(csv, "qid,inference_time_sec")?;
        for rec in &state.latencies {
            writeln!(csv, "{},{}", rec.qid, rec.inference_time_sec)?;
        }

        // Checkpoint last: everything above is already durable when the
        // index advances.
        std::fs::write(self.path("progress.txt"), state.next_index.to_string())?;
        Ok(())
    }
}

// =============================================================================
// Worker task
// =============================================================================

/// Output of one processed item.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub answer: char,
    pub explanation: String,
}

/// One unit of per-item work. Unlike solvers, a task is fallible: the worker
/// needs the error discriminant to tell a rate limit from a skippable failure.
#[async_trait]
pub trait WorkerTask: Send + Sync {
    async fn run(&self, item: &Question) -> Result<TaskOutput, ProviderError>;
}

/// The STEM chain-of-thought task: one completion call on the small tier,
/// answer extracted from the marker line.
pub struct StemWorkerTask {
    gateway: std::sync::Arc<dyn CompletionGateway>,
}

impl StemWorkerTask {
    pub fn new(gateway: std::sync::Arc<dyn CompletionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl WorkerTask for StemWorkerTask {
    async fn run(&self, item: &Question) -> Result<TaskOutput, ProviderError> {
        let prompt = prompts::build_cot_prompt(&item.question, &item.choices);
        let req = ChatRequest::new(
            ModelTier::Small,
            vec![Message::user(prompt)],
            Attribution::new("worker::stem"),
        )
        .max_completion_tokens(2048);

        let resp = self.gateway.chat(req).await?;
        Ok(TaskOutput {
            answer: stem::extract_answer(&resp.content).unwrap_or('A'),
            explanation: resp.content,
        })
    }
}

// =============================================================================
// Batch worker
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// Resumable batch worker over a dataset.
pub struct BatchWorker<S: RunStorage> {
    task: Box<dyn WorkerTask>,
    storage: S,
    rate_limit_pause: Duration,
}

impl<S: RunStorage> BatchWorker<S> {
    pub fn new(task: Box<dyn WorkerTask>, storage: S) -> Self {
        Self {
            task,
            storage,
            rate_limit_pause: DEFAULT_RATE_LIMIT_PAUSE,
        }
    }

    /// Override the rate-limit pause (tests use milliseconds).
    pub fn rate_limit_pause(mut self, pause: Duration) -> Self {
        self.rate_limit_pause = pause;
        self
    }

    /// Run the worker over the dataset, resuming from the stored checkpoint.
    /// Indices below the checkpoint are never reprocessed; the checkpoint file
    /// is left on disk at the end as an audit trail, so an already-complete
    /// run is a no-op.
    pub async fn run(&self, dataset: &[Question]) -> Result<RunSummary, WorkerError> {
        let mut state = self.storage.load()?;
        let mut summary = RunSummary::default();

        if state.next_index > 0 {
            eprintln!(
                "[worker] resuming at index {} of {}",
                state.next_index,
                dataset.len()
            );
        }

        while state.next_index < dataset.len() {
            let item = &dataset[state.next_index];
            let start = Instant::now();

            match self.task.run(item).await {
                Ok(out) => {
                    let elapsed = (start.elapsed().as_secs_f64() * 10_000.0).round() / 10_000.0;
                    state.answers.push(AnswerRecord {
                        qid: item.qid.clone(),
                        answer: out.answer,
                    });
                    state.explanations.push(ExplanationRecord {
                        qid: item.qid.clone(),
                        question: item.question.clone(),
                        choices: item.choices.clone(),
                        explanation: out.explanation,
                    });
                    state.latencies.push(LatencyRecord {
                        qid: item.qid.clone(),
                        inference_time_sec: elapsed,
                    });
                    state.next_index += 1;
                    self.storage.persist(&state)?;
                    summary.processed += 1;
                    eprintln!(
                        "[worker] {}/{} {} -> {}",
                        state.next_index,
                        dataset.len(),
                        item.qid,
                        out.answer
                    );
                }
                Err(ProviderError::RateLimited { .. }) => {
                    // Not a failure: pause and retry the same index.
                    eprintln!(
                        "[worker] rate limited at index {}; pausing {:?}",
                        state.next_index, self.rate_limit_pause
                    );
                    tokio::time::sleep(self.rate_limit_pause).await;
                    eprintln!("[worker] resuming after rate-limit pause");
                }
                Err(err) => {
                    // Skip-and-continue: the item is absent from every
                    // artifact, which keeps them mutually consistent.
                    tracing::warn!(qid = %item.qid, error = %err, "item failed; skipping");
                    state.next_index += 1;
                    self.storage.persist(&state)?;
                    summary.skipped += 1;
                }
            }
        }

        eprintln!(
            "[worker] finished: {} processed, {} skipped",
            summary.processed, summary.skipped
        );
        Ok(summary)
    }
}
