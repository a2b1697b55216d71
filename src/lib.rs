#![forbid(unsafe_code)]

//! # mcq-harness
//!
//! Routed multiple-choice answering over the VNPT model tiers.
//!
//! Each question is classified into one of three answering strategies — RAG
//! (answer from a passage embedded in the question), STEM (chain-of-thought),
//! or Reasoning (refusal validation or index-grounded answering) — and solved
//! with the matching prompt, retrieval stack, and model tier. A resumable
//! batch worker makes long rate-limited runs crash-safe by checkpointing every
//! processed item to disk.
//!
//! The interesting parts:
//! - [`router`] — classification with a heuristic short-circuit, strict-JSON
//!   plus regex classifier parsing, and safety/failure fallbacks
//! - [`retrieval`] — word-window chunking and cosine top-k ranking
//! - [`worker`] — the checkpointed batch state machine
//! - [`gateway`] — the retrying completion client with refusal and rate-limit
//!   decoding

pub mod dataset;
pub mod driver;
pub mod embedding;
pub mod gateway;
pub mod prompts;
pub mod retrieval;
pub mod router;
pub mod solvers;
pub mod vector_index;
pub mod worker;

pub use dataset::{load_questions, Question};
pub use gateway::{
    Attribution, ChatRequest, ChatResponse, CompletionGateway, Message, ModelTier, NoopUsageSink,
    ProviderError, RetryingGateway, StderrUsageSink, UsageSink,
};
pub use router::{classify, RouteLabel, RoutingDecision, Subtype};
pub use solvers::{normalize_answer, solve, SolverDeps};
pub use worker::{BatchWorker, FsRunStorage, RunStorage, StemWorkerTask};
