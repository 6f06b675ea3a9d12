// src/engine/script.rs

//! JavaScript rule family.
//!
//! Heuristic rules scan the raw text. Assertion rules are batched into one
//! sandbox evaluation per run; the submission must define `solution`.

use regex::Regex;
use std::sync::OnceLock;

use crate::challenge::TestCase;
use crate::engine::events::{GradingEvent, GradingEventKind};
use crate::engine::rules::{Assertion, Heuristic, ScriptRule};
use crate::engine::sink::EventSink;
use crate::engine::TestResult;
use crate::run_id::RunId;
use crate::sandbox::{Evaluation, Probe, ProbeOutcome, SandboxError, ScriptEngine, SolutionState};

pub const NO_SOLUTION: &str = "No function named 'solution' found";
pub const MANUAL_CHECK: &str = "Manual check required";
const MIN_INPUTS: usize = 2;

/// Grade a JavaScript submission, one result per case, in order.
pub async fn grade_script(
    source: &str,
    test_cases: &[TestCase],
    engine: &dyn ScriptEngine,
    run_id: &RunId,
    sink: &mut dyn EventSink,
) -> Vec<TestResult> {
    let rules: Vec<ScriptRule> = test_cases
        .iter()
        .map(|tc| ScriptRule::resolve(&tc.name))
        .collect();

    // Per test case: its assertions and where their outcomes start.
    let mut probes = Vec::new();
    let mut plans: Vec<Option<(usize, Vec<Assertion>)>> = Vec::with_capacity(rules.len());
    for rule in &rules {
        if let ScriptRule::Assertion(a) = rule {
            let checks = a.assertions();
            let offset = probes.len();
            probes.extend(checks.iter().map(|c| Probe {
                args: c.args.clone(),
            }));
            plans.push(Some((offset, checks)));
        } else {
            plans.push(None);
        }
    }

    let evaluation = if probes.is_empty() {
        None
    } else {
        sink.emit(GradingEvent::now(run_id, GradingEventKind::SandboxStarted));
        let outcome = engine.evaluate(source, &probes).await;
        match &outcome {
            Ok(evaluation) => {
                if let Some(m) = &evaluation.metrics {
                    tracing::debug!(
                        run_id = %run_id,
                        duration_ms = m.duration_ms as u64,
                        max_rss_kb = ?m.max_rss_kb,
                        "sandbox metrics"
                    );
                }
                sink.emit(GradingEvent::now(run_id, GradingEventKind::SandboxFinished));
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "sandbox evaluation failed");
                sink.emit(GradingEvent::now(run_id, GradingEventKind::SandboxFailed));
            }
        }
        Some(outcome)
    };

    rules
        .iter()
        .zip(plans)
        .map(|(rule, plan)| match rule {
            ScriptRule::Heuristic(h) => heuristic(source, *h),
            ScriptRule::Assertion(_) => match (plan, evaluation.as_ref()) {
                (Some((offset, checks)), Some(evaluation)) => judge(&checks, offset, evaluation),
                _ => TestResult::fail(NO_SOLUTION),
            },
            ScriptRule::Unknown(_) => TestResult::pass_with(MANUAL_CHECK),
        })
        .collect()
}

fn judge(
    checks: &[Assertion],
    offset: usize,
    evaluation: &Result<Evaluation, SandboxError>,
) -> TestResult {
    let evaluation = match evaluation {
        Ok(e) => e,
        Err(e) => return TestResult::fail(e.to_string()),
    };

    if let SolutionState::Missing { reason } = &evaluation.solution {
        tracing::debug!(reason = ?reason, "submission did not define solution");
        return TestResult::fail(NO_SOLUTION);
    }

    for (i, check) in checks.iter().enumerate() {
        match evaluation.outcomes.get(offset + i) {
            Some(ProbeOutcome::Returned(value)) if check.expected.strict_eq(value) => {}
            Some(ProbeOutcome::Returned(_)) => return TestResult::fail(check.failure_message()),
            Some(ProbeOutcome::Threw(message)) => return TestResult::fail(message.clone()),
            None => {
                return TestResult::fail(format!(
                    "No result reported for {}",
                    check.call_text()
                ))
            }
        }
    }

    TestResult::pass()
}

/* ---------------- heuristics ---------------- */

fn heuristic(source: &str, rule: Heuristic) -> TestResult {
    match rule {
        Heuristic::InputExists => {
            if input_re().is_match(source) {
                TestResult::pass()
            } else {
                TestResult::fail("No input element found")
            }
        }
        Heuristic::InputsExist => {
            let found = input_re().find_iter(source).count();
            if found >= MIN_INPUTS {
                TestResult::pass()
            } else {
                TestResult::fail(format!(
                    "Expected at least {} input elements, found {}",
                    MIN_INPUTS, found
                ))
            }
        }
        Heuristic::ButtonExists => {
            if button_pair_re().is_match(source) || input_button_re().is_match(source) {
                TestResult::pass()
            } else {
                TestResult::fail("No button element found")
            }
        }
        Heuristic::AlertOnClick => {
            let alert = alert_re().is_match(source);
            let listener = listener_re().is_match(source);
            match (alert, listener) {
                (true, true) => TestResult::pass(),
                (false, false) => {
                    TestResult::fail("Missing both alert() call and click event listener")
                }
                (false, true) => TestResult::fail("Missing alert() call"),
                (true, false) => {
                    TestResult::fail("Missing click event listener (addEventListener or onclick)")
                }
            }
        }
    }
}

fn input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<input\b").expect("valid input regex"))
}

fn button_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<button\b[^>]*>.*?</button\s*>").expect("valid button regex")
    })
}

fn input_button_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<input\b[^>]*\btype\s*=\s*["']?(?:button|submit)\b"#)
            .expect("valid input button regex")
    })
}

fn alert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\balert\s*\(").expect("valid alert regex"))
}

fn listener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)addEventListener\s*\(|\bonclick\b").expect("valid listener regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rules::JsValue;
    use crate::sandbox::testing::ScriptedEngine;
    use crate::sinks::collecting::CollectingEventSink;

    fn cases(names: &[&str]) -> Vec<TestCase> {
        names
            .iter()
            .map(|n| TestCase {
                name: (*n).to_string(),
                description: String::new(),
            })
            .collect()
    }

    async fn grade(source: &str, names: &[&str], engine: &ScriptedEngine) -> Vec<TestResult> {
        let mut sink = CollectingEventSink::new();
        grade_script(source, &cases(names), engine, &RunId::new(), &mut sink).await
    }

    #[tokio::test]
    async fn correct_sum_passes() {
        let engine = ScriptedEngine::returning(&[("solution([1,2,3])", JsValue::Number(6.0))]);
        let src = "function solution(arr){return arr.reduce((a,b)=>a+b,0);}";
        let results = grade(src, &["Sum correct"], &engine).await;
        assert_eq!(results, vec![TestResult::pass()]);
    }

    #[tokio::test]
    async fn wrong_sum_reports_expected_call() {
        let engine = ScriptedEngine::returning(&[("solution([1,2,3])", JsValue::Number(5.0))]);
        let results = grade("function solution(){return 5}", &["Sum correct"], &engine).await;
        assert_eq!(
            results,
            vec![TestResult::fail("Expected solution([1,2,3]) to be 6")]
        );
    }

    #[tokio::test]
    async fn even_odd_reports_the_first_failing_call() {
        let engine = ScriptedEngine::returning(&[
            ("solution(4)", JsValue::String("even".into())),
            ("solution(5)", JsValue::String("even".into())),
        ]);
        let results = grade("...", &["Even odd correct"], &engine).await;
        assert_eq!(
            results[0],
            TestResult::fail("Expected solution(5) to be \"odd\"")
        );
    }

    #[tokio::test]
    async fn thrown_exceptions_surface_verbatim_and_do_not_abort() {
        let engine = ScriptedEngine::throwing("arr.reduce is not a function")
            .with("solution(\"hello\")", JsValue::String("olleh".into()));
        let results = grade(
            "...",
            &["Sum correct", "Reverse correct", "Custom"],
            &engine,
        )
        .await;
        assert_eq!(results[0], TestResult::fail("arr.reduce is not a function"));
        assert_eq!(results[1], TestResult::pass());
        assert_eq!(results[2], TestResult::pass_with(MANUAL_CHECK));
    }

    #[tokio::test]
    async fn missing_solution_fails_only_correctness_checks() {
        let engine = ScriptedEngine::missing_solution();
        let src = "<input id=a><button>Go</button><script>b.onclick = () => alert('x')</script>";
        let results = grade(
            src,
            &["Max correct", "Input exists", "Button exists", "Alert on click", "Style"],
            &engine,
        )
        .await;
        assert_eq!(results[0], TestResult::fail(NO_SOLUTION));
        assert!(results[1].passed);
        assert!(results[2].passed);
        assert!(results[3].passed);
        assert_eq!(results[4], TestResult::pass_with(MANUAL_CHECK));
    }

    #[tokio::test]
    async fn sandbox_faults_become_failures() {
        let engine = ScriptedEngine::timing_out(3000);
        let mut sink = CollectingEventSink::new();
        let results = grade_script(
            "while(true){}",
            &cases(&["Sum correct", "Vowel count correct"]),
            &engine,
            &RunId::new(),
            &mut sink,
        )
        .await;
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(results[0].message, "Execution timed out after 3000ms");
        assert!(sink.kinds().contains(&GradingEventKind::SandboxFailed));
    }

    #[tokio::test]
    async fn sandbox_runs_once_per_grading_pass() {
        let engine = ScriptedEngine::returning(&[]);
        grade(
            "...",
            &["Sum correct", "Reverse correct", "Even odd correct", "Max correct"],
            &engine,
        )
        .await;
        assert_eq!(engine.calls(), 1);
        assert_eq!(engine.last_probe_count(), 5);
    }

    #[tokio::test]
    async fn load_error_still_reports_missing_solution() {
        let engine = ScriptedEngine::failing_to_load("document is not defined");
        let results = grade(
            "document.querySelector('p'); function solution(a){return 6}",
            &["Sum correct", "Max correct", "Button exists"],
            &engine,
        )
        .await;
        assert_eq!(results[0], TestResult::fail(NO_SOLUTION));
        assert_eq!(results[1], TestResult::fail(NO_SOLUTION));
        assert_eq!(results[2], TestResult::fail("No button element found"));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn heuristic_only_battery_never_starts_the_sandbox() {
        let engine = ScriptedEngine::returning(&[]);
        let mut sink = CollectingEventSink::new();
        grade_script(
            "<input>",
            &cases(&["Input exists"]),
            &engine,
            &RunId::new(),
            &mut sink,
        )
        .await;
        assert_eq!(engine.calls(), 0);
        assert!(sink.kinds().is_empty());
    }

    #[test]
    fn alert_on_click_distinguishes_what_is_missing() {
        let listener = "button.addEventListener('click', () => alert('hi'))";
        assert!(heuristic(listener, Heuristic::AlertOnClick).passed);

        let r = heuristic("alert('hi')", Heuristic::AlertOnClick);
        assert_eq!(
            r.message,
            "Missing click event listener (addEventListener or onclick)"
        );

        let r = heuristic("button.onclick = greet;", Heuristic::AlertOnClick);
        assert_eq!(r.message, "Missing alert() call");

        let r = heuristic("console.log('hi')", Heuristic::AlertOnClick);
        assert_eq!(r.message, "Missing both alert() call and click event listener");
    }

    #[test]
    fn buttons_need_a_real_element() {
        assert!(heuristic("<button id=b>Go</button>", Heuristic::ButtonExists).passed);
        assert!(heuristic("<input type=\"submit\" value=Go>", Heuristic::ButtonExists).passed);
        assert!(heuristic("<INPUT TYPE=button>", Heuristic::ButtonExists).passed);
        assert!(!heuristic("<button>", Heuristic::ButtonExists).passed);
        assert!(!heuristic("const button = 1;", Heuristic::ButtonExists).passed);
        assert!(!heuristic("<input type=text>", Heuristic::ButtonExists).passed);
    }

    #[test]
    fn inputs_exist_counts_elements() {
        assert!(heuristic("<input><input>", Heuristic::InputsExist).passed);
        let r = heuristic("<input>", Heuristic::InputsExist);
        assert_eq!(r.message, "Expected at least 2 input elements, found 1");
        assert_eq!(
            heuristic("", Heuristic::InputExists),
            TestResult::fail("No input element found")
        );
    }
}
