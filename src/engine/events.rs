use crate::run_id::RunId;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum GradingEventKind {
    RunCreated,
    SandboxStarted,
    SandboxFinished,
    SandboxFailed,
    RunFinished,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GradingEvent {
    pub run_id: RunId,
    pub kind: GradingEventKind,
    pub timestamp: SystemTime,
}

impl GradingEvent {
    pub fn now(run_id: &RunId, kind: GradingEventKind) -> Self {
        Self {
            run_id: run_id.clone(),
            kind,
            timestamp: SystemTime::now(),
        }
    }
}
