//! Turns a candidate vector into an objective value by running the external
//! program once.

use std::io::Read;
use std::process::{ExitStatus, Output};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use cf_types::{CfResult, Direction, EvaluationError, EvaluationRecord};

use crate::command::{current_instance, Executable, Invocation};
use crate::output::{OutputParser, ParsedOutput};
use crate::recorder::EvaluationRecorder;

/// Internal value reported for any failed evaluation. Always the worst
/// possible value for the minimizing library, whatever the direction.
pub const SENTINEL: f64 = f64::INFINITY;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STDERR_TAIL: usize = 512;

/// The objective as seen by the algorithm library.
#[derive(Debug)]
pub struct ProcessEvaluator {
    executable: Executable,
    names: Vec<String>,
    direction: Direction,
    timeout: Option<Duration>,
    parser: OutputParser,
    recorder: Arc<EvaluationRecorder>,
}

impl ProcessEvaluator {
    pub fn new(
        executable: Executable,
        names: Vec<String>,
        direction: Direction,
        recorder: Arc<EvaluationRecorder>,
    ) -> CfResult<Self> {
        Ok(Self {
            executable,
            names,
            direction,
            timeout: None,
            parser: OutputParser::new()?,
            recorder,
        })
    }

    /// Kill the program when one evaluation runs longer than `timeout`.
    ///
    /// Only the direct child is killed. Processes it started itself (for
    /// example the commands of an `sh` script) keep running until they exit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn recorder(&self) -> &Arc<EvaluationRecorder> {
        &self.recorder
    }

    /// Internal (minimize-form) value of the objective at `x`.
    ///
    /// Successful evaluations are recorded with their true sign. Failures are
    /// logged and reported as [`SENTINEL`].
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self.try_evaluate(x) {
            Ok(value) => {
                self.recorder.append(EvaluationRecord::new(x, value));
                self.direction.factor() * value
            }
            Err(e) => {
                warn!(input = ?x, error = %e, "evaluation failed");
                SENTINEL
            }
        }
    }

    /// True-sign value of the objective at `x`, without recording it.
    pub fn try_evaluate(&self, x: &[f64]) -> Result<f64, EvaluationError> {
        let invocation = Invocation::build(&self.executable, current_instance(), &self.names, x);
        debug!(command = %invocation, "running objective");

        let output = run(&invocation, self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluationError::NonZeroExit {
                program: invocation.program,
                code: describe_status(output.status),
                stderr: tail(stderr.trim(), STDERR_TAIL),
            });
        }

        match self.parser.parse(&combine(&output.stdout, &output.stderr)) {
            ParsedOutput::Value(v) => Ok(v),
            ParsedOutput::NoMatch => Err(EvaluationError::NoMatch),
            ParsedOutput::Malformed(token) => Err(EvaluationError::Malformed { token }),
        }
    }
}

/// Stdout then stderr, on separate lines so no marker region spans both.
fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push('\n');
    combined.push_str(&String::from_utf8_lossy(stderr));
    combined
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}

fn run(invocation: &Invocation, timeout: Option<Duration>) -> Result<Output, EvaluationError> {
    let program = invocation.program.clone();
    let spawn_error = |e: std::io::Error| EvaluationError::Spawn {
        program: program.clone(),
        message: e.to_string(),
    };

    let limit = match timeout {
        None => return invocation.command().output().map_err(spawn_error),
        Some(limit) => limit,
    };

    let mut child = invocation.command().spawn().map_err(spawn_error)?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || read_all(stdout));
    let stderr_reader = thread::spawn(move || read_all(stderr));

    let deadline = Instant::now() + limit;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EvaluationError::Timeout {
                    program,
                    timeout: limit,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return Err(EvaluationError::Io {
                    program,
                    message: e.to_string(),
                })
            }
        }
    };

    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

fn read_all<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}
