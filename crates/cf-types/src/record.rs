//! Evaluation records and the shapes results take on their way out of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Direction, RunId};

/// One successful evaluation: the candidate vector and the true-sign output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub input: Vec<f64>,
    pub output: f64,
}

impl EvaluationRecord {
    pub fn new(input: &[f64], output: f64) -> Self {
        Self {
            input: input.to_vec(),
            output,
        }
    }
}

/// Uniform result shape returned by the strategy adapter.
///
/// `fun` and `funl` are internal (minimize-form) values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub x: Vec<f64>,
    pub fun: f64,
    /// Evaluation count reported by the algorithm.
    pub nfev: usize,
    pub xl: Option<Vec<Vec<f64>>>,
    pub funl: Option<Vec<f64>>,
}

/// A local optimum in the external sign convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOptimum {
    pub x: Vec<f64>,
    pub value: f64,
}

/// Exportable table: one column per variable plus `out`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ResultTable {
    pub const OUTPUT_COLUMN: &'static str = "out";

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the `out` column, top to bottom.
    pub fn outputs(&self) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.last().copied())
            .collect()
    }
}

/// Final, sign-corrected outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub best_x: Vec<f64>,
    pub best_value: f64,
    /// Evaluations reported by the algorithm (includes failed ones).
    pub nfev: usize,
    /// Evaluations that produced a usable value.
    pub recorded: usize,
    pub local_optima: Option<Vec<LocalOptimum>>,
    pub table: ResultTable,
}

/// Serializable digest of a finished run, for logs, events and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub algorithm: String,
    pub direction: Direction,
    pub nfev: usize,
    pub recorded: usize,
    pub best_x: Vec<f64>,
    pub best_value: f64,
    pub local_optima: Option<Vec<LocalOptimum>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(
        result: &RunResult,
        algorithm: &str,
        direction: Direction,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: result.run_id,
            algorithm: algorithm.to_string(),
            direction,
            nfev: result.nfev,
            recorded: result.recorded,
            best_x: result.best_x.clone(),
            best_value: result.best_value,
            local_optima: result.local_optima.clone(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn local_optima_count(&self) -> usize {
        self.local_optima.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_snapshots_input() {
        let mut vec = vec![1.0, 2.0];
        let record = EvaluationRecord::new(&vec, 3.0);
        vec[0] = 99.0;
        assert_eq!(record.input, vec![1.0, 2.0]);
    }

    #[test]
    fn table_outputs_reads_last_column() {
        let table = ResultTable {
            columns: vec!["x".into(), ResultTable::OUTPUT_COLUMN.into()],
            rows: vec![vec![0.5, -1.0], vec![0.25, 2.0]],
        };
        assert_eq!(table.len(), 2);
        assert_eq!(table.outputs(), vec![-1.0, 2.0]);
    }

    #[test]
    fn summary_copies_result() {
        let result = RunResult {
            run_id: uuid::Uuid::new_v4(),
            best_x: vec![1.0],
            best_value: 2.0,
            nfev: 10,
            recorded: 8,
            local_optima: Some(vec![LocalOptimum {
                x: vec![1.0],
                value: 2.0,
            }]),
            table: ResultTable::default(),
        };
        let summary = RunSummary::new(&result, "shgo_sobol", Direction::Maximize, Utc::now());
        assert_eq!(summary.run_id, result.run_id);
        assert_eq!(summary.local_optima_count(), 1);
        assert!(summary.elapsed() >= chrono::Duration::zero());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["direction"], "maximize");
        assert_eq!(json["recorded"], 8);
    }
}
