//! Runs one optimization end to end: validate, evaluate, reconcile, export.

use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{error, info};

use cf_data::ResultSink;
use cf_types::{CfError, CfResult, RunConfig, RunResult, RunSummary};

use crate::adapter::optimize;
use crate::command::Executable;
use crate::evaluator::ProcessEvaluator;
use crate::reconcile::reconcile;
use crate::recorder::EvaluationRecorder;
use crate::status::{RunEvent, RunState, RunStatus};

pub struct Driver {
    config: RunConfig,
    status: RunStatus,
    events: Option<Sender<RunEvent>>,
}

impl Driver {
    pub fn new(config: RunConfig) -> Self {
        let status = RunStatus::new(&config);
        Self {
            config,
            status,
            events: None,
        }
    }

    /// Publish lifecycle events on `tx`.
    pub fn with_events(mut self, tx: Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Run the optimization without exporting anything.
    pub fn run(&mut self) -> CfResult<RunResult> {
        self.run_with(None)
    }

    /// Run the optimization and hand the result to `sink`. Nothing is exported
    /// unless the run succeeds; an export failure fails the run.
    pub fn run_and_export(&mut self, sink: &dyn ResultSink) -> CfResult<RunResult> {
        self.run_with(Some(sink))
    }

    fn run_with(&mut self, sink: Option<&dyn ResultSink>) -> CfResult<RunResult> {
        if self.status.state != RunState::Pending {
            return Err(CfError::Internal(format!(
                "run {} has already been started",
                self.config.id
            )));
        }
        if let Err(e) = self.config.validate() {
            self.fail(&e);
            return Err(e);
        }

        self.status.mark_running();
        self.emit(RunEvent::Started {
            run_id: self.config.id,
            algorithm: self.config.algorithm.name().to_string(),
        });
        info!(
            run_id = %self.config.id,
            algorithm = self.config.algorithm.name(),
            direction = %self.config.direction,
            variables = self.config.bounds.len(),
            "run started"
        );

        let outcome = self.execute().and_then(|result| {
            let summary = RunSummary::new(
                &result,
                self.config.algorithm.name(),
                self.config.direction,
                self.status.started_at.unwrap_or(self.config.created_at),
            );
            if let Some(sink) = sink {
                sink.export(&result, &summary)?;
            }
            Ok((result, summary))
        });

        match outcome {
            Ok((result, summary)) => {
                info!(
                    run_id = %summary.run_id,
                    nfev = summary.nfev,
                    recorded = summary.recorded,
                    best_x = ?summary.best_x,
                    best_value = summary.best_value,
                    local_optima = summary.local_optima_count(),
                    elapsed_ms = summary.elapsed().num_milliseconds(),
                    "run completed"
                );
                self.status.mark_completed(summary.clone());
                self.emit(RunEvent::Completed(summary));
                Ok(result)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn execute(&self) -> CfResult<RunResult> {
        let names = self.config.bounds.names();
        let bounds = self.config.bounds.bounds();
        let recorder = Arc::new(EvaluationRecorder::new());

        let evaluator = ProcessEvaluator::new(
            Executable::parse(&self.config.executable)?,
            names.clone(),
            self.config.direction,
            Arc::clone(&recorder),
        )?
        .with_timeout(self.config.timeout);

        let raw = optimize(&|x: &[f64]| evaluator.evaluate(x), &bounds, &self.config.algorithm)?;
        drop(evaluator);

        Ok(reconcile(
            self.config.id,
            raw,
            self.config.direction,
            recorder.drain(),
            &names,
        ))
    }

    fn fail(&mut self, e: &CfError) {
        let message = e.to_string();
        error!(run_id = %self.config.id, error = %message, "run failed");
        self.status.mark_failed(message.clone());
        self.emit(RunEvent::Failed {
            run_id: self.config.id,
            message,
        });
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eggholder_script, script};
    use cf_data::{load_result_table, CsvExporter};
    use cf_types::{
        Algorithm, AnnealingSettings, BoundsSet, DeSettings, Direction, ShgoSettings,
    };
    use crossbeam_channel::unbounded;

    fn de(max_iterations: usize, workers: usize) -> Algorithm {
        Algorithm::DifferentialEvolution(DeSettings {
            workers,
            tolerance: 0.0,
            max_iterations,
            population_multiplier: 5,
            seed: Some(17),
        })
    }

    #[test]
    fn eggholder_run_is_sorted_and_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let bounds = BoundsSet::new()
            .add("x1", -512.0, 512.0)
            .add("x2", -512.0, 512.0);
        let config = RunConfig::new(eggholder_script(dir.path()), bounds, de(3, 2));
        let (tx, rx) = unbounded();
        let mut driver = Driver::new(config).with_events(tx);

        let result = driver.run().unwrap();
        assert_eq!(driver.status().state, RunState::Completed);

        // Population of 10, initial batch plus three generations.
        assert_eq!(result.nfev, 40);
        assert_eq!(result.recorded, 40);
        let outputs = result.table.outputs();
        assert!(outputs.windows(2).all(|w| w[0] <= w[1]));
        assert!((outputs[0] - result.best_value).abs() < 1e-9);
        assert_eq!(result.table.columns, vec!["x1", "x2", "out"]);

        let events: Vec<RunEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], RunEvent::Started { .. }));
        assert!(matches!(events[1], RunEvent::Completed(ref s) if s.nfev == 40));
    }

    #[test]
    fn maximize_reports_true_sign() {
        let dir = tempfile::tempdir().unwrap();
        // Concave objective, maximum 10 at x = 1.
        let exe = script(
            dir.path(),
            r#"awk -v x="$3" 'BEGIN { printf "begin_output ans: %.12f end_output\n", 10 - (x - 1) * (x - 1) }'"#,
        );
        let bounds = BoundsSet::new().add("x", -3.0, 3.0);
        let algorithm = Algorithm::DualAnnealing(AnnealingSettings {
            max_iterations: 5,
            seed: Some(2),
        });
        let config = RunConfig::new(exe, bounds, algorithm).with_direction(Direction::Maximize);
        let result = Driver::new(config).run().unwrap();

        assert!(result.best_value > 9.99, "best = {}", result.best_value);
        let outputs = result.table.outputs();
        assert!(outputs.windows(2).all(|w| w[0] >= w[1]));
        assert!((outputs[0] - result.best_value).abs() < 1e-6);
    }

    #[test]
    fn failing_evaluations_are_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        // Fails whenever x is negative.
        let exe = script(
            dir.path(),
            r#"case "$3" in -*) exit 1 ;; esac
echo "begin_output ans: $3 end_output""#,
        );
        let bounds = BoundsSet::new().add("x", -1.0, 1.0);
        let config = RunConfig::new(exe, bounds, de(2, 1));
        let result = Driver::new(config).run().unwrap();

        assert!(result.recorded < result.nfev);
        assert!(result.table.rows.iter().all(|r| r[0] >= 0.0 && r[1] >= 0.0));
        assert!(result.best_value.is_finite());
    }

    #[test]
    fn partition_run_reports_local_optima_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(
            dir.path(),
            r#"awk -v x="$3" -v y="$4" 'BEGIN { printf "begin_output ans: %.12f end_output\n", x * x + y * y }'"#,
        );
        let bounds = BoundsSet::new().add("a", -1.0, 1.0).add("b", -1.0, 1.0);
        let algorithm = Algorithm::PartitionSampleSobol(ShgoSettings {
            workers: 3,
            tolerance: 1e-4,
            samples: Some(16),
            iterations: 1,
        });
        let csv_path = dir.path().join("out").join("results.csv");
        let config = RunConfig::new(exe, bounds, algorithm).with_output(&csv_path);
        let sink = CsvExporter::new(&config.output_path);
        let result = Driver::new(config).run_and_export(&sink).unwrap();

        let optima = result.local_optima.as_ref().unwrap();
        assert!(!optima.is_empty());
        assert_eq!(optima[0].value, result.best_value);
        assert!(result.best_value < 1e-3);

        let table = load_result_table(&csv_path).unwrap();
        assert_eq!(table.columns, vec!["a", "b", "out"]);
        assert_eq!(table.len(), result.recorded);
    }

    #[test]
    fn invalid_config_fails_before_any_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let exe = script(dir.path(), &format!("touch \"{}\"", marker.display()));
        let config = RunConfig::new(exe, BoundsSet::new(), Algorithm::default());
        let (tx, rx) = unbounded();
        let mut driver = Driver::new(config).with_events(tx);

        let err = driver.run().unwrap_err();
        assert!(err.is_config());
        assert!(!marker.exists());
        assert_eq!(driver.status().state, RunState::Failed);
        assert!(matches!(rx.try_recv(), Ok(RunEvent::Failed { .. })));
    }

    #[test]
    fn export_failure_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), r#"echo "begin_output ans: $3 end_output""#);
        let bounds = BoundsSet::new().add("x", 0.0, 1.0);
        let config = RunConfig::new(exe, bounds, de(1, 1));
        let (tx, rx) = unbounded();
        let mut driver = Driver::new(config).with_events(tx);

        // The temp directory itself is not a writable file.
        let sink = CsvExporter::new(dir.path());
        let err = driver.run_and_export(&sink).unwrap_err();
        assert!(matches!(err, CfError::Export(_)));
        assert_eq!(driver.status().state, RunState::Failed);

        let events: Vec<RunEvent> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(RunEvent::Failed { .. })));
        assert!(!events.iter().any(|e| matches!(e, RunEvent::Completed(_))));
    }

    #[test]
    fn driver_runs_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), r#"echo "begin_output ans: $3 end_output""#);
        let bounds = BoundsSet::new().add("x", 0.0, 1.0);
        let mut driver = Driver::new(RunConfig::new(exe, bounds, de(1, 1)));
        driver.run().unwrap();
        assert!(matches!(driver.run(), Err(CfError::Internal(_))));
    }
}
