//! Stage-scoped run logging.
//!
//! Every pipeline stage gets one `StageTimer`: entry is logged when the
//! timer starts, elapsed wall-clock when it finishes, and degraded
//! outcomes (intent fallback, governor no-op) are recorded in between so
//! the completion line tells the whole story of the stage. The per-stage
//! timings are what operators read to see which external model is eating
//! the request budget.

use std::time::Instant;

use tracing::{info, warn};

use lumen_models::RequestId;

/// Times and logs one pipeline stage.
pub struct StageTimer {
    request_id: String,
    stage: &'static str,
    started: Instant,
    degraded: bool,
}

impl StageTimer {
    /// Begin a stage. Logs the entry immediately.
    pub fn start(request_id: &RequestId, stage: &'static str) -> Self {
        info!(
            request_id = %request_id,
            stage = stage,
            "stage started"
        );
        Self {
            request_id: request_id.to_string(),
            stage,
            started: Instant::now(),
            degraded: false,
        }
    }

    /// Record a degraded-but-successful outcome for this stage, e.g. the
    /// sentence-split intent fallback or a governor no-op.
    pub fn degrade(&mut self, reason: &str) {
        self.degraded = true;
        warn!(
            request_id = %self.request_id,
            stage = self.stage,
            reason = reason,
            "stage degraded"
        );
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Close the stage, logging elapsed time, degradation, and a detail
    /// line. Returns the elapsed seconds for run accounting.
    pub fn finish(self, detail: &str) -> f64 {
        let elapsed = self.elapsed_seconds();
        info!(
            request_id = %self.request_id,
            stage = self.stage,
            elapsed_s = format!("{:.2}", elapsed),
            degraded = self.degraded,
            "stage completed: {}",
            detail
        );
        elapsed
    }
}
