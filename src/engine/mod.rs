// src/engine/mod.rs

//! Grading harness.
//!
//! `Grader::run` is the single entry point: it picks the rule family from
//! the challenge category, produces exactly one `TestResult` per test case
//! in the challenge's order, and never fails. Every internal problem
//! (unparseable markup, a submission that does not compile, a sandbox
//! fault) becomes a failing result with a diagnostic message.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod events;
pub mod markup;
pub mod rules;
pub mod script;
pub mod sink;
pub mod validate;

use crate::challenge::{Category, Challenge};
use crate::config::{FallbackPolicy, GradingConfig};
use crate::preview::{needs_preview, render_preview};
use crate::run_id::RunId;
use crate::sandbox::ScriptEngine;
use crate::util::sha256_hex;
use events::{GradingEvent, GradingEventKind};
use sink::EventSink;

pub const PASS_MESSAGE: &str = "Test passed";

/* ---------------- results ---------------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub passed: bool,
    pub message: String,
}

impl TestResult {
    pub fn pass() -> Self {
        Self::pass_with(PASS_MESSAGE)
    }

    pub fn pass_with(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Outcome of one grading run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub run_id: RunId,
    pub challenge_id: String,
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub total: usize,
    pub points: u32,

    /// Preview score, not the stored grade.
    pub score: u32,

    /// SHA-256 of the graded source.
    pub digest: String,

    /// Host page for the sandboxed preview frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl GradeReport {
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }
}

/// `round(passed / total × points)`, zero for an empty battery.
pub fn score(passed: usize, total: usize, points: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let ratio = passed.min(total) as f64 / total as f64;
    (ratio * f64::from(points)).round() as u32
}

/* ---------------- grader ---------------- */

#[derive(Debug, Clone)]
pub struct Grader {
    engine: Arc<dyn ScriptEngine>,
    fallback: FallbackPolicy,
    max_markup_depth: usize,
}

impl Grader {
    pub fn new(engine: Arc<dyn ScriptEngine>, grading: &GradingConfig) -> Self {
        Self {
            engine,
            fallback: grading.fallback,
            max_markup_depth: grading.max_markup_depth,
        }
    }

    /// Grade `source` against `challenge`.
    pub async fn run(
        &self,
        source: &str,
        challenge: &Challenge,
        sink: &mut dyn EventSink,
    ) -> GradeReport {
        let run_id = RunId::new();
        sink.emit(GradingEvent::now(&run_id, GradingEventKind::RunCreated));

        let results = match challenge.category {
            Category::HtmlCss => markup::grade_markup(
                source,
                &challenge.test_cases,
                self.fallback,
                self.max_markup_depth,
            ),
            Category::JavaScript => {
                script::grade_script(
                    source,
                    &challenge.test_cases,
                    self.engine.as_ref(),
                    &run_id,
                    sink,
                )
                .await
            }
        };

        let total = challenge.test_cases.len();
        debug_assert_eq!(results.len(), total);
        let passed = results.iter().filter(|r| r.passed).count();
        let score = score(passed, total, challenge.points);

        let preview = if needs_preview(challenge.category, source) {
            Some(render_preview(source, &challenge.title))
        } else {
            None
        };

        sink.emit(GradingEvent::now(&run_id, GradingEventKind::RunFinished));
        tracing::info!(
            run_id = %run_id,
            challenge = %challenge.id,
            category = %challenge.category,
            passed,
            total,
            score,
            "grading finished"
        );

        GradeReport {
            run_id,
            challenge_id: challenge.id.clone(),
            results,
            passed,
            total,
            points: challenge.points,
            score,
            digest: sha256_hex(source.as_bytes()),
            preview,
        }
    }
}
