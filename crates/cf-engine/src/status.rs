//! Run lifecycle tracking and the events published to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cf_types::{Direction, RunConfig, RunId, RunSummary};

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub id: RunId,
    pub algorithm: String,
    pub direction: Direction,
    pub state: RunState,
    pub summary: Option<RunSummary>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunStatus {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            id: config.id,
            algorithm: config.algorithm.name().to_string(),
            direction: config.direction,
            state: RunState::Pending,
            summary: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, summary: RunSummary) {
        self.state = RunState::Completed;
        self.finished_at = Some(summary.finished_at);
        self.summary = Some(summary);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// Notifications a driver publishes while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { run_id: RunId, algorithm: String },
    Completed(RunSummary),
    Failed { run_id: RunId, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_types::{Algorithm, BoundsSet, ResultTable, RunResult};

    fn sample_config() -> RunConfig {
        let bounds = BoundsSet::new().add("x", 0.0, 1.0);
        RunConfig::new("prog", bounds, Algorithm::default()).with_direction(Direction::Maximize)
    }

    #[test]
    fn run_status_lifecycle() {
        let config = sample_config();
        let mut status = RunStatus::new(&config);

        assert_eq!(status.state, RunState::Pending);
        assert_eq!(status.algorithm, "shgo_simplicial");
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, RunState::Running);
        assert!(status.started_at.is_some());
        assert!(status.finished_at.is_none());

        let result = RunResult {
            run_id: config.id,
            best_x: vec![0.5],
            best_value: 1.0,
            nfev: 3,
            recorded: 3,
            local_optima: None,
            table: ResultTable::default(),
        };
        let summary = RunSummary::new(&result, "shgo_simplicial", config.direction, Utc::now());
        status.mark_completed(summary);
        assert_eq!(status.state, RunState::Completed);
        assert!(status.finished_at.is_some());
        assert_eq!(status.summary.as_ref().map(|s| s.best_value), Some(1.0));
    }

    #[test]
    fn failure_records_error() {
        let mut status = RunStatus::new(&sample_config());
        status.mark_running();
        status.mark_failed("boom".to_string());
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(status.error.as_deref(), Some("boom"));
        assert!(status.finished_at.is_some());
    }
}
