// src/runner.rs

use crate::backend::BackendClient;
use crate::challenge::{Catalog, Category, Challenge};
use crate::cli::{Cli, Command};
use crate::config::{Config, OutputMode};
use crate::engine::validate::validate_catalog;
use crate::engine::{GradeReport, Grader};
use crate::sandbox::NodeSandbox;
use crate::server;
use crate::sinks::collecting::CollectingEventSink;
use crate::state::{today, AppState, Session, Theme};
use crate::timer::{format_clock, Countdown, CountdownHandle};
use crate::util::{ensure_dir, read_to_string};

use anyhow::{bail, Context, Result};
use notify::{RecursiveMode, Watcher};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Entry point from `main.rs`.
///
/// Local state is loaded before the command runs and saved after it,
/// whether or not the command succeeded.
pub async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load_or_default(&cli.config)?;

    if let Command::Serve { addr } = &cli.command {
        return server::serve(addr, cfg).await;
    }

    let state_path = cfg.state.path.clone();
    let mut state = AppState::load(&state_path)?;

    let outcome = dispatch(cli.command, cfg, &mut state).await;
    let saved = state.save(&state_path);

    outcome?;
    saved
}

async fn dispatch(command: Command, mut cfg: Config, state: &mut AppState) -> Result<()> {
    match command {
        Command::Run {
            challenge,
            file,
            preview,
            submit,
            budget_time,
            budget_mem,
        } => {
            if let Some(ms) = budget_time {
                cfg.budgets.duration_ms = ms;
            }
            if let Some(mb) = budget_mem {
                cfg.budgets.memory_mb = mb;
            }
            run_once(&cfg, state, &challenge, &file, preview.as_deref(), submit).await
        }

        Command::Watch { challenge, file } => watch(&cfg, state, &challenge, &file).await,

        Command::List => list(&cfg, state),

        Command::InitSubmission { challenge, out } => init_submission(&cfg, &challenge, out),

        Command::Validate => validate(&cfg),

        Command::Stats => {
            print_stats(state);
            Ok(())
        }

        Command::Theme { theme } => {
            state.theme = theme;
            eprintln!("Theme set to {:?}", theme);
            Ok(())
        }

        Command::Login { user, token } => {
            eprintln!("Stored credentials for {}", user);
            state.session = Some(Session { user, token });
            Ok(())
        }

        Command::Logout => {
            state.session = None;
            eprintln!("Credentials removed");
            Ok(())
        }

        Command::Serve { .. } => bail!("serve is handled before state is loaded"),
    }
}

/* ---------------- run ---------------- */

pub fn build_grader(cfg: &Config) -> Grader {
    let sandbox = NodeSandbox::new(&cfg.runtime, &cfg.budgets);
    Grader::new(Arc::new(sandbox), &cfg.grading)
}

fn find_challenge<'a>(catalog: &'a Catalog, id: &str) -> Result<&'a Challenge> {
    catalog.get(id).with_context(|| {
        let available = catalog
            .all()
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("Challenge '{}' not found. Available: {}", id, available)
    })
}

async fn grade(cfg: &Config, grader: &Grader, source: &str, challenge: &Challenge) -> GradeReport {
    if cfg.grading.delay_ms > 0 {
        eprintln!("Grading...");
        tokio::time::sleep(Duration::from_millis(cfg.grading.delay_ms)).await;
    }

    let mut sink = CollectingEventSink::new();
    grader.run(source, challenge, &mut sink).await
}

async fn run_once(
    cfg: &Config,
    state: &mut AppState,
    challenge_id: &str,
    file: &Path,
    preview_out: Option<&Path>,
    submit: bool,
) -> Result<()> {
    let catalog = Catalog::resolve(cfg.catalog.dir.as_deref())?;
    let challenge = find_challenge(&catalog, challenge_id)?;
    let source = read_to_string(file)?;
    let grader = build_grader(cfg);

    let report = grade(cfg, &grader, &source, challenge).await;
    println!("{}", render_report(cfg.output.mode, state.theme, challenge, &report)?);

    if let Some(out) = preview_out {
        match &report.preview {
            Some(page) => {
                write_file(out, page)?;
                eprintln!("Preview written to {}", out.display());
            }
            None => eprintln!("No preview for this submission (no markup found)"),
        }
    }

    state.record_run(&report, today());

    if submit {
        submit_report(cfg, state, &report).await?;
    }

    if !report.all_passed() {
        bail!(
            "{} of {} tests failed",
            report.total - report.passed,
            report.total
        );
    }
    Ok(())
}

async fn submit_report(cfg: &Config, state: &AppState, report: &GradeReport) -> Result<()> {
    let base_url = cfg
        .backend
        .base_url
        .as_deref()
        .context("backend.base_url must be set to submit progress")?;

    let client = BackendClient::new(base_url, state.session.as_ref())?;
    client.save_progress(report).await?;
    if report.all_passed() {
        client.complete_challenge(report).await?;
    }
    Ok(())
}

/* ---------------- watch mode ---------------- */

async fn watch(cfg: &Config, state: &mut AppState, challenge_id: &str, file: &Path) -> Result<()> {
    let catalog = Catalog::resolve(cfg.catalog.dir.as_deref())?;
    let challenge = find_challenge(&catalog, challenge_id)?;
    let grader = build_grader(cfg);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })
    .context("Failed to initialise file watcher")?;
    watcher
        .watch(file, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", file.display()))?;

    let mut countdown = None;
    if challenge.time_limit > 0 {
        let clock = Countdown::new(challenge.time_limit);
        eprintln!("Time limit: {}", clock.format());
        countdown = Some(clock.spawn(Duration::from_secs(1)));
    }

    regrade(cfg, &grader, state, challenge, file).await;

    loop {
        let wake = tokio::select! {
            Some(event) = rx.recv() => Wake::File(event),
            left = next_tick(&mut countdown) => Wake::Clock(left),
            _ = tokio::signal::ctrl_c() => Wake::Quit,
        };

        match wake {
            Wake::File(Ok(ev)) if ev.kind.is_modify() || ev.kind.is_create() => {
                // editors often emit several events per save
                while rx.try_recv().is_ok() {}
                regrade(cfg, &grader, state, challenge, file).await;
            }
            Wake::File(Ok(_)) => {}
            Wake::File(Err(e)) => tracing::warn!(error = %e, "file watcher error"),
            Wake::Clock(Some(0)) => eprintln!("Time is up. Grading stays open."),
            Wake::Clock(Some(s)) if s % 60 == 0 || s <= 10 => {
                eprintln!("Time left: {}", format_clock(s))
            }
            Wake::Clock(Some(_)) => {}
            Wake::Clock(None) => countdown = None,
            Wake::Quit => {
                if let Some(handle) = &countdown {
                    eprintln!("Stopped with {} left", format_clock(handle.remaining()));
                }
                break;
            }
        }
    }

    Ok(())
}

enum Wake {
    File(notify::Result<notify::Event>),
    Clock(Option<u64>),
    Quit,
}

async fn next_tick(countdown: &mut Option<CountdownHandle>) -> Option<u64> {
    match countdown {
        Some(handle) => handle.changed().await,
        None => std::future::pending().await,
    }
}

async fn regrade(
    cfg: &Config,
    grader: &Grader,
    state: &mut AppState,
    challenge: &Challenge,
    file: &Path,
) {
    clear_screen();

    let source = match read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return;
        }
    };

    let report = grade(cfg, grader, &source, challenge).await;
    match render_report(cfg.output.mode, state.theme, challenge, &report) {
        Ok(out) => println!("{}", out),
        Err(e) => eprintln!("Error: {e:#}"),
    }
    state.record_run(&report, today());
}

fn clear_screen() {
    use std::io::Write;
    print!("\x1b[2J\x1b[H");
    let _ = std::io::stdout().flush();
}

/* ---------------- catalog commands ---------------- */

fn list(cfg: &Config, state: &AppState) -> Result<()> {
    let catalog = Catalog::resolve(cfg.catalog.dir.as_deref())?;
    for c in catalog.all() {
        let done = state
            .progress
            .get(&c.id)
            .map(|p| p.completed)
            .unwrap_or(false);
        println!(
            "{} {:<20} {:<11} {:<13} {:>4} pts  {}  {}",
            if done { "✔" } else { " " },
            c.id,
            c.category.to_string(),
            c.difficulty,
            c.points,
            format_clock(c.time_limit),
            c.title
        );
    }
    Ok(())
}

fn init_submission(cfg: &Config, challenge_id: &str, out: Option<PathBuf>) -> Result<()> {
    let catalog = Catalog::resolve(cfg.catalog.dir.as_deref())?;
    let challenge = find_challenge(&catalog, challenge_id)?;

    let path = out.unwrap_or_else(|| {
        let ext = match challenge.category {
            Category::HtmlCss => "html",
            Category::JavaScript => "js",
        };
        PathBuf::from(format!("{}.{}", challenge.id, ext))
    });

    if path.exists() {
        bail!("{:?} already exists (refusing to overwrite)", path);
    }

    write_file(&path, &challenge.starter_code)?;
    eprintln!("Created {}", path.display());
    Ok(())
}

fn validate(cfg: &Config) -> Result<()> {
    let catalog = Catalog::resolve(cfg.catalog.dir.as_deref())?;
    let result = validate_catalog(&catalog);

    for w in &result.warnings {
        eprintln!("warning [{}] {}", w.code, w.message);
    }
    for e in &result.errors {
        eprintln!("error [{}] {}", e.code, e.message);
    }

    if !result.is_valid() {
        bail!("Catalog has {} error(s)", result.errors.len());
    }
    eprintln!("Catalog OK ({} challenges)", catalog.all().len());
    Ok(())
}

fn print_stats(state: &AppState) {
    let today = today();
    println!("theme:    {:?}", state.theme);
    println!(
        "user:     {}",
        state
            .session
            .as_ref()
            .map(|s| s.user.as_str())
            .unwrap_or("(not logged in)")
    );
    println!(
        "streak:   {} day(s), longest {}",
        state.streak.current_as_of(today),
        state.streak.longest
    );
    println!("complete: {}", state.completed_count());
    for (id, p) in &state.progress {
        println!(
            "  {:<20} best {:>4}  attempts {:>3}{}",
            id,
            p.best_score,
            p.attempts,
            if p.completed { "  ✔" } else { "" }
        );
    }
}

/* ---------------- output ---------------- */

struct Palette {
    enabled: bool,
    pass: &'static str,
    fail: &'static str,
}

impl Palette {
    fn for_theme(theme: Theme, use_color: bool) -> Self {
        let (pass, fail) = match theme {
            Theme::Dark => ("92", "91"),
            Theme::Light | Theme::System => ("32", "31"),
        };
        Self {
            enabled: use_color,
            pass,
            fail,
        }
    }

    fn paint(&self, text: &str, passed: bool) -> String {
        if self.enabled {
            let color = if passed { self.pass } else { self.fail };
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }
}

fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn render_report(
    mode: OutputMode,
    theme: Theme,
    challenge: &Challenge,
    report: &GradeReport,
) -> Result<String> {
    match mode {
        OutputMode::Json => {
            serde_json::to_string_pretty(report).context("Failed to format report as JSON")
        }
        OutputMode::Pretty => Ok(format_cards(
            challenge,
            report,
            &Palette::for_theme(theme, should_use_color()),
        )),
        OutputMode::Simple => Ok(format_cards(
            challenge,
            report,
            &Palette::for_theme(theme, false),
        )),
    }
}

fn format_cards(challenge: &Challenge, report: &GradeReport, palette: &Palette) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", challenge.title, challenge.category));

    for (tc, result) in challenge.test_cases.iter().zip(&report.results) {
        let status = if result.passed { "PASS" } else { "FAIL" };
        out.push_str(&format!(
            "{} {}\n",
            palette.paint(status, result.passed),
            tc.name
        ));
        if !tc.description.is_empty() {
            out.push_str(&format!("     {}\n", tc.description));
        }
        out.push_str(&format!("     {}\n", result.message));
    }

    let summary = format!(
        "score: {}/{} ({}/{} passed)",
        report.score, report.points, report.passed, report.total
    );
    out.push_str(&palette.paint(&summary, report.all_passed()));
    out
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TestResult;
    use crate::run_id::RunId;

    fn sample() -> (Challenge, GradeReport) {
        let challenge = Catalog::builtin().get("landing-page").cloned().unwrap();
        let total = challenge.test_cases.len();
        let mut results = vec![TestResult::pass(); total];
        results[1] = TestResult::fail("Navigation menu should have at least 3 links, found 2");
        let report = GradeReport {
            run_id: RunId::new(),
            challenge_id: challenge.id.clone(),
            results,
            passed: total - 1,
            total,
            points: challenge.points,
            score: crate::engine::score(total - 1, total, challenge.points),
            digest: "d".into(),
            preview: None,
        };
        (challenge, report)
    }

    #[test]
    fn simple_output_zips_results_with_test_cases() {
        let (challenge, report) = sample();
        let out = render_report(OutputMode::Simple, Theme::System, &challenge, &report).unwrap();
        assert!(out.contains("PASS Header exists"));
        assert!(out.contains("FAIL Navigation menu\n     A <nav> with at least 3 links\n     Navigation menu should have at least 3 links, found 2"));
        assert!(out.ends_with("score: 167/200 (5/6 passed)"));
        assert!(!out.contains("\x1b["));
    }

    #[test]
    fn json_output_is_the_report() {
        let (challenge, report) = sample();
        let out = render_report(OutputMode::Json, Theme::Dark, &challenge, &report).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["score"], 167);
        assert_eq!(v["results"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn dark_theme_uses_bright_colours() {
        let p = Palette::for_theme(Theme::Dark, true);
        assert_eq!(p.paint("PASS", true), "\x1b[92mPASS\x1b[0m");
        assert_eq!(p.paint("FAIL", false), "\x1b[91mFAIL\x1b[0m");
    }

    #[test]
    fn init_submission_writes_starter_code_once() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sum.js");
        let cfg = Config::default();

        init_submission(&cfg, "array-sum", Some(out.clone())).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.contains("function solution(arr)"));

        assert!(init_submission(&cfg, "array-sum", Some(out)).is_err());
        assert!(init_submission(&cfg, "nope", None).is_err());
    }

    #[tokio::test]
    async fn run_once_records_progress_and_writes_preview() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        std::fs::write(
            &page,
            r#"<meta name="viewport" content="width=device-width"><style>p { width: 50%; }</style>
<header><nav><a>1</a><a>2</a><a>3</a></nav></header>
<main><h1>t</h1><p>p</p><img src="x.png"></main><footer></footer>"#,
        )
        .unwrap();
        let preview = dir.path().join("out/preview.html");

        let mut cfg = Config::default();
        cfg.output.mode = OutputMode::Simple;
        let mut state = AppState::default();

        run_once(&cfg, &mut state, "landing-page", &page, Some(&preview), false)
            .await
            .unwrap();

        let progress = &state.progress["landing-page"];
        assert!(progress.completed);
        assert_eq!(progress.best_score, 200);
        assert!(std::fs::read_to_string(&preview).unwrap().contains("srcdoc="));
    }

    #[tokio::test]
    async fn run_once_fails_when_tests_fail_but_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page.html");
        std::fs::write(&page, "<p>nothing</p>").unwrap();

        let mut cfg = Config::default();
        cfg.output.mode = OutputMode::Simple;
        let mut state = AppState::default();

        let err = run_once(&cfg, &mut state, "landing-page", &page, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tests failed"));
        assert_eq!(state.progress["landing-page"].attempts, 1);
    }

    #[tokio::test]
    async fn submit_requires_a_backend() {
        let (_, report) = sample();
        let err = submit_report(&Config::default(), &AppState::default(), &report)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backend.base_url"));
    }
}
