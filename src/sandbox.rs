// src/sandbox.rs

//! Isolated execution of untrusted JavaScript.
//!
//! The grader never evaluates submissions in-process. `NodeSandbox` spawns
//! a Node child per run with:
//! - a fresh temp dir as cwd and an empty environment (PATH only)
//! - the submission compiled inside a `vm` context with no `require`,
//!   `process`, timers or network, and string code generation disabled
//! - a per-call timeout inside the child, a wall-clock budget on the child
//!   and a sampled peak-RSS budget
//!
//! The shim writes exactly one JSON object to stdout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use thiserror::Error;
use tokio::process::Command as TokioCommand;

use crate::checks::{check_budgets, BudgetsResolved};
use crate::config::{Budgets, Runtime};
use crate::engine::rules::JsValue;
use crate::metrics::{InvocationMetrics, MemoryTracker};
use crate::shim::{node_shim, SHIM_FILE};

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to start JavaScript runtime '{runtime}': {reason}")]
    Spawn { runtime: String, reason: String },

    #[error("Execution timed out after {limit_ms}ms")]
    TimedOut { limit_ms: u64 },

    #[error("Memory budget exceeded: {used_mb}MB (budget {limit_mb}MB)")]
    MemoryExceeded { used_mb: u64, limit_mb: u64 },

    #[error("Sandbox returned malformed output: {0}")]
    Protocol(String),

    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Arguments for one `solution(...)` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Probe {
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolutionState {
    Found,
    /// Compile or load failure, or no function named `solution`.
    Missing { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Returned(JsValue),
    Threw(String),
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub solution: SolutionState,
    /// One per probe, in probe order. Empty when the solution is missing.
    pub outcomes: Vec<ProbeOutcome>,
    pub metrics: Option<InvocationMetrics>,
}

#[async_trait]
pub trait ScriptEngine: std::fmt::Debug + Send + Sync {
    async fn evaluate(&self, source: &str, probes: &[Probe]) -> Result<Evaluation, SandboxError>;
}

/* ---------------- node ---------------- */

#[derive(Debug, Clone)]
pub struct NodeSandbox {
    node: String,
    node_args: Vec<String>,
    budgets: BudgetsResolved,
}

impl NodeSandbox {
    pub fn new(runtime: &Runtime, budgets: &Budgets) -> Self {
        Self {
            node: runtime.node.clone(),
            node_args: runtime.node_args.clone(),
            budgets: BudgetsResolved::from(budgets),
        }
    }
}

#[derive(Serialize)]
struct ShimInput<'a> {
    source: &'a str,
    probes: Vec<&'a [Value]>,
    call_timeout_ms: u64,
}

#[derive(Deserialize)]
struct ShimOutput {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    solution: bool,
    #[serde(default)]
    load_error: Option<String>,
    #[serde(default)]
    calls: Vec<ShimCall>,
}

#[derive(Deserialize)]
struct ShimCall {
    threw: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    value: Value,
}

#[async_trait]
impl ScriptEngine for NodeSandbox {
    async fn evaluate(&self, source: &str, probes: &[Probe]) -> Result<Evaluation, SandboxError> {
        let tmp = tempdir()?;

        let input = ShimInput {
            source,
            probes: probes.iter().map(|p| p.args.as_slice()).collect(),
            call_timeout_ms: self.budgets.call_timeout_ms,
        };
        let input_path = tmp.path().join("input.json");
        let bytes =
            serde_json::to_vec(&input).map_err(|e| SandboxError::Protocol(e.to_string()))?;
        std::fs::write(&input_path, bytes)?;

        let shim_path = tmp.path().join(SHIM_FILE);
        std::fs::write(&shim_path, node_shim())?;

        let mut cmd = TokioCommand::new(&self.node);
        cmd.args(&self.node_args);
        if let Some(kb) = self.budgets.memory_kb {
            cmd.arg(format!("--max-old-space-size={}", (kb / 1024).max(16)));
        }
        cmd.arg(&shim_path)
            .arg(&input_path)
            .current_dir(tmp.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            runtime: self.node.clone(),
            reason: e.to_string(),
        })?;

        let mem = child
            .id()
            .map(|pid| MemoryTracker::start(pid, Duration::from_millis(20)));

        let limit = Duration::from_millis(self.budgets.duration_ms);
        let waited = tokio::time::timeout(limit, child.wait_with_output()).await;
        let max_rss_kb = mem.and_then(MemoryTracker::stop_and_take);

        let output = match waited {
            Ok(res) => res?,
            Err(_) => {
                return Err(SandboxError::TimedOut {
                    limit_ms: self.budgets.duration_ms,
                })
            }
        };

        let metrics = InvocationMetrics {
            duration_ms: start.elapsed().as_millis(),
            max_rss_kb,
        };
        check_budgets(&metrics, &self.budgets)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: ShimOutput = serde_json::from_str(stdout.trim()).map_err(|e| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(%stderr, "sandbox stderr");
            SandboxError::Protocol(format!("{} (exit status {})", e, output.status))
        })?;

        tracing::debug!(
            duration_ms = metrics.duration_ms as u64,
            max_rss_kb = ?metrics.max_rss_kb,
            "sandbox finished"
        );

        into_evaluation(parsed, probes.len(), metrics)
    }
}

fn into_evaluation(
    out: ShimOutput,
    expected_calls: usize,
    metrics: InvocationMetrics,
) -> Result<Evaluation, SandboxError> {
    if !out.ok {
        return Err(SandboxError::Protocol(
            out.error.unwrap_or_else(|| "sandbox reported failure".to_string()),
        ));
    }

    if !out.solution {
        return Ok(Evaluation {
            solution: SolutionState::Missing {
                reason: out.load_error,
            },
            outcomes: Vec::new(),
            metrics: Some(metrics),
        });
    }

    if out.calls.len() != expected_calls {
        return Err(SandboxError::Protocol(format!(
            "expected {} call results, got {}",
            expected_calls,
            out.calls.len()
        )));
    }

    Ok(Evaluation {
        solution: SolutionState::Found,
        outcomes: out.calls.into_iter().map(decode_call).collect(),
        metrics: Some(metrics),
    })
}

fn decode_call(call: ShimCall) -> ProbeOutcome {
    if call.threw {
        return ProbeOutcome::Threw(call.error.unwrap_or_default());
    }

    let kind = call.kind.unwrap_or_else(|| "undefined".to_string());
    let value = match (kind.as_str(), call.value) {
        ("number", Value::Number(n)) => n.as_f64().map(JsValue::Number),
        // Non-finite numbers arrive as their String() form.
        ("number", Value::String(s)) => match s.as_str() {
            "NaN" => Some(JsValue::Number(f64::NAN)),
            "Infinity" => Some(JsValue::Number(f64::INFINITY)),
            "-Infinity" => Some(JsValue::Number(f64::NEG_INFINITY)),
            _ => None,
        },
        ("string", Value::String(s)) => Some(JsValue::String(s)),
        ("boolean", Value::Bool(b)) => Some(JsValue::Bool(b)),
        _ => None,
    };

    ProbeOutcome::Returned(value.unwrap_or(JsValue::Other(kind)))
}

/* ---------------- test double ---------------- */


#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> InvocationMetrics {
        InvocationMetrics {
            duration_ms: 1,
            max_rss_kb: None,
        }
    }

    fn shim_output(raw: &str) -> ShimOutput {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn decodes_primitive_returns_and_throws() {
        let out = shim_output(
            r#"{"ok":true,"solution":true,"load_error":null,"calls":[
                {"threw":false,"type":"number","value":6},
                {"threw":false,"type":"string","value":"olleh"},
                {"threw":false,"type":"number","value":"NaN"},
                {"threw":false,"type":"object","value":null},
                {"threw":true,"error":"boom"}
            ]}"#,
        );
        let eval = into_evaluation(out, 5, metrics()).unwrap();
        assert_eq!(eval.solution, SolutionState::Found);
        assert_eq!(eval.outcomes[0], ProbeOutcome::Returned(JsValue::Number(6.0)));
        assert_eq!(
            eval.outcomes[1],
            ProbeOutcome::Returned(JsValue::String("olleh".into()))
        );
        assert!(matches!(
            eval.outcomes[2],
            ProbeOutcome::Returned(JsValue::Number(n)) if n.is_nan()
        ));
        assert_eq!(
            eval.outcomes[3],
            ProbeOutcome::Returned(JsValue::Other("object".into()))
        );
        assert_eq!(eval.outcomes[4], ProbeOutcome::Threw("boom".into()));
        assert_eq!(eval.metrics.map(|m| m.duration_ms), Some(1));
    }

    #[test]
    fn missing_solution_keeps_the_load_error() {
        let out = shim_output(
            r#"{"ok":true,"solution":false,"load_error":"Unexpected token '<'","calls":[]}"#,
        );
        let eval = into_evaluation(out, 3, metrics()).unwrap();
        assert_eq!(
            eval.solution,
            SolutionState::Missing {
                reason: Some("Unexpected token '<'".into())
            }
        );
    }

    #[test]
    fn call_count_mismatch_is_a_protocol_error() {
        let out = shim_output(r#"{"ok":true,"solution":true,"calls":[]}"#);
        assert!(matches!(
            into_evaluation(out, 1, metrics()),
            Err(SandboxError::Protocol(_))
        ));
    }

    #[test]
    fn shim_failures_are_protocol_errors() {
        let out = shim_output(r#"{"ok":false,"error":"Failed to read sandbox input"}"#);
        let err = into_evaluation(out, 0, metrics()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Sandbox returned malformed output: Failed to read sandbox input"
        );
    }

    #[tokio::test]
    async fn missing_runtime_is_a_spawn_error() {
        let runtime = Runtime {
            node: "definitely-not-a-node-binary-7f3a".into(),
            node_args: Vec::new(),
        };
        let sandbox = NodeSandbox::new(&runtime, &Budgets::default());
        let err = sandbox
            .evaluate("function solution() {}", &[Probe { args: vec![] }])
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }), "{err}");
    }

    #[tokio::test]
    #[ignore = "needs node on PATH"]
    async fn node_sandbox_end_to_end() {
        let sandbox = NodeSandbox::new(&Runtime::default(), &Budgets::default());
        let probes = [
            Probe {
                args: vec![serde_json::json!([1, 2, 3])],
            },
            Probe {
                args: vec![serde_json::json!("boom")],
            },
        ];
        let src = "function solution(x) { if (x === 'boom') throw new Error('kaboom'); \
                   return x.reduce((a, b) => a + b, 0); }";
        let eval = sandbox.evaluate(src, &probes).await.unwrap();
        assert_eq!(eval.outcomes[0], ProbeOutcome::Returned(JsValue::Number(6.0)));
        assert_eq!(eval.outcomes[1], ProbeOutcome::Threw("kaboom".into()));

        let eval = sandbox.evaluate("function (", &probes).await.unwrap();
        assert!(matches!(eval.solution, SolutionState::Missing { .. }));

        let eval = sandbox
            .evaluate("function solution() { while (true) {} }", &probes[..1])
            .await
            .unwrap();
        assert!(matches!(&eval.outcomes[0], ProbeOutcome::Threw(m) if m.contains("timed out")));
    }
}
