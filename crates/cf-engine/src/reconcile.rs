//! Maps the library's minimize-form result back to the operator's sign
//! convention and orders the evaluation table.

use cf_types::{
    Direction, EvaluationRecord, LocalOptimum, RawResult, ResultTable, RunId, RunResult,
};

/// Build the final run result. Pure: identical inputs give identical output.
pub fn reconcile(
    run_id: RunId,
    raw: RawResult,
    direction: Direction,
    mut records: Vec<EvaluationRecord>,
    names: &[String],
) -> RunResult {
    let factor = direction.factor();

    let local_optima = match (raw.xl, raw.funl) {
        (Some(xl), Some(funl)) => Some(
            xl.into_iter()
                .zip(funl)
                .map(|(x, f)| LocalOptimum {
                    x,
                    value: factor * f,
                })
                .collect(),
        ),
        _ => None,
    };

    // Stable: equal outputs keep completion order.
    match direction {
        Direction::Minimize => records.sort_by(|a, b| a.output.total_cmp(&b.output)),
        Direction::Maximize => records.sort_by(|a, b| b.output.total_cmp(&a.output)),
    }

    let mut columns = names.to_vec();
    columns.push(ResultTable::OUTPUT_COLUMN.to_string());
    let rows = records
        .iter()
        .map(|r| {
            let mut row = r.input.clone();
            row.push(r.output);
            row
        })
        .collect();

    RunResult {
        run_id,
        best_x: raw.x,
        best_value: factor * raw.fun,
        nfev: raw.nfev,
        recorded: records.len(),
        local_optima,
        table: ResultTable { columns, rows },
    }
}
