use std::collections::BTreeMap;
use std::time::Duration;

use super::StageKind;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageMetrics {
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total_elapsed: Duration,
}

impl StageMetrics {
    pub fn average_elapsed(&self) -> Duration {
        if self.executed == 0 {
            return Duration::ZERO;
        }
        self.total_elapsed / self.executed as u32
    }
}

/// Running totals across every run of one executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineMetrics {
    pub runs: u64,
    pub failed_runs: u64,
    pub early_terminations: u64,
    pub cancelled_runs: u64,
    pub stages: BTreeMap<StageKind, StageMetrics>,
}

impl PipelineMetrics {
    pub fn stage(&self, kind: StageKind) -> StageMetrics {
        self.stages.get(&kind).copied().unwrap_or_default()
    }

    pub(crate) fn record_executed(&mut self, kind: StageKind, elapsed: Duration, success: bool) {
        let stage = self.stages.entry(kind).or_default();
        stage.executed += 1;
        stage.total_elapsed = stage.total_elapsed.saturating_add(elapsed);
        if !success {
            stage.failed += 1;
        }
    }

    pub(crate) fn record_skipped(&mut self, kind: StageKind) {
        self.stages.entry(kind).or_default().skipped += 1;
    }

    pub(crate) fn record_run(&mut self, success: bool, early_terminated: bool) {
        self.runs += 1;
        if !success {
            self.failed_runs += 1;
        }
        if early_terminated {
            self.early_terminations += 1;
        }
    }

    pub(crate) fn record_cancelled(&mut self) {
        self.cancelled_runs += 1;
    }
}
