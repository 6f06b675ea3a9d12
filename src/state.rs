// src/state.rs

//! Local application state: theme, session, streak and per-challenge
//! progress.
//!
//! Loaded once at startup, passed by reference to the commands that need
//! it, and written back on the way out. A missing file means a fresh state.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::GradeReport;
use crate::util::{ensure_dir, read_to_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Credentials for the backend. Issued elsewhere; stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
    #[serde(default)]
    pub last_active: Option<NaiveDate>,
}

impl Streak {
    /// Same day: unchanged. Next day: +1. Any other gap: back to 1.
    pub fn record(&mut self, today: NaiveDate) {
        self.current = match self.last_active {
            Some(last) if last == today => return,
            Some(last) if last.succ_opt() == Some(today) => self.current + 1,
            _ => 1,
        };
        self.longest = self.longest.max(self.current);
        self.last_active = Some(today);
    }

    /// The streak as of `today`: zero once a full day has been missed.
    pub fn current_as_of(&self, today: NaiveDate) -> u32 {
        match self.last_active {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.current,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeProgress {
    pub attempts: u32,
    pub best_score: u32,
    pub completed: bool,
    #[serde(default)]
    pub last_digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub streak: Streak,
    #[serde(default)]
    pub progress: BTreeMap<String, ChallengeProgress>,
}

impl AppState {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no state file, starting fresh");
            return Ok(Self::default());
        }

        let raw = read_to_string(path)?;
        serde_json::from_str(&raw)
            .with_context(|| format!("State file is not valid JSON: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(self).context("Failed to serialize state")?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write state file {:?}", path))?;
        Ok(())
    }

    /// Fold a finished run into progress and the streak.
    pub fn record_run(&mut self, report: &GradeReport, today: NaiveDate) -> &ChallengeProgress {
        self.streak.record(today);

        let entry = self.progress.entry(report.challenge_id.clone()).or_default();
        entry.attempts += 1;
        entry.best_score = entry.best_score.max(report.score);
        entry.completed |= report.all_passed();
        entry.last_digest = Some(report.digest.clone());
        entry
    }

    pub fn completed_count(&self) -> usize {
        self.progress.values().filter(|p| p.completed).count()
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
