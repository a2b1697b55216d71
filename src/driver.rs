//! Single-item driver: route each question, solve it, write the submission.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::dataset::Question;
use crate::gateway::ModelTier;
use crate::router::{self, RoutingDecision};
use crate::solvers::{self, SolverDeps};

/// One answered question.
#[derive(Debug, Clone)]
pub struct PredictionRow {
    pub qid: String,
    pub answer: char,
    pub elapsed_sec: f64,
}

/// Route and solve every question in order. Per-item failures never surface:
/// the router and solvers degrade internally, so this always produces one row
/// per question.
pub async fn predict(
    deps: &SolverDeps,
    router_tier: ModelTier,
    questions: &[Question],
) -> Vec<PredictionRow> {
    let mut rows = Vec::with_capacity(questions.len());

    for (i, item) in questions.iter().enumerate() {
        let start = Instant::now();
        let question = item.question.trim();

        let decision = router::classify(
            deps.gateway.as_ref(),
            router_tier,
            question,
            &item.choices,
        )
        .await;
        let answer = solvers::solve(deps, decision, question, &item.choices).await;

        let elapsed_sec = start.elapsed().as_secs_f64();
        eprintln!(
            "[predict] {}/{} {} [{}/{}] -> {} ({:.1}s)",
            i + 1,
            questions.len(),
            item.qid,
            decision.label.as_str(),
            decision.subtype.as_str(),
            answer,
            elapsed_sec,
        );

        rows.push(PredictionRow {
            qid: item.qid.clone(),
            answer,
            elapsed_sec,
        });
    }

    rows
}

/// Route every question without solving, for dataset annotation. Needs only
/// the completion gateway, not the retrieval stack.
pub async fn classify_all(
    gateway: &dyn crate::gateway::CompletionGateway,
    router_tier: ModelTier,
    questions: &[Question],
) -> Vec<(String, RoutingDecision)> {
    let mut out = Vec::with_capacity(questions.len());
    for item in questions {
        let decision =
            router::classify(gateway, router_tier, item.question.trim(), &item.choices).await;
        out.push((item.qid.clone(), decision));
    }
    out
}

/// Write the two-column submission CSV, optionally with a third per-item
/// elapsed-time column.
pub fn write_submission_csv(
    path: impl AsRef<Path>,
    rows: &[PredictionRow],
    with_time: bool,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    if with_time {
        writeln!(file, "qid,answer,time_sec")?;
        for row in rows {
            writeln!(file, "{},{},{:.4}", row.qid, row.answer, row.elapsed_sec)?;
        }
    } else {
        writeln!(file, "qid,answer")?;
        for row in rows {
            writeln!(file, "{},{}", row.qid, row.answer)?;
        }
    }
    Ok(())
}
