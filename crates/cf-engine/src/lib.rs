//! # cf-engine
//!
//! Evaluation bridge and run driver: turns candidate vectors into runs of an
//! external program, feeds the values to the optimization library, and
//! reconciles what comes back into a sorted, sign-correct result.

pub mod adapter;
pub mod command;
pub mod driver;
pub mod evaluator;
pub mod output;
pub mod reconcile;
pub mod recorder;
pub mod status;

pub use adapter::optimize;
pub use command::{Executable, Invocation};
pub use driver::Driver;
pub use evaluator::{ProcessEvaluator, SENTINEL};
pub use output::{OutputParser, ParsedOutput};
pub use reconcile::reconcile;
pub use recorder::EvaluationRecorder;
pub use status::{RunEvent, RunState, RunStatus};
