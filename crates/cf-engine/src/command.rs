//! Builds the argument vector handed to the objective program for one
//! evaluation.
//!
//! The program receives
//! `<leading args...> <instance> <names-token> <v1> ... <vN>` as separate
//! arguments. Nothing goes through a shell.

use std::fmt;
use std::process::{Command, Stdio};

use cf_types::{config_error, CfResult};

/// The operator's executable descriptor, split into program and fixed
/// leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    pub program: String,
    pub leading: Vec<String>,
}

impl Executable {
    /// Split on whitespace, honoring double quotes so paths with spaces survive.
    pub fn parse(descriptor: &str) -> CfResult<Self> {
        let mut tokens = split_descriptor(descriptor).into_iter();
        let program = tokens
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| config_error!("executable must not be empty"))?;
        Ok(Self {
            program,
            leading: tokens.collect(),
        })
    }
}

fn split_descriptor(descriptor: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in descriptor.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// Variable names as one argument: `['x1' 'x2']`.
pub fn names_token(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!("[{}]", quoted.join(" "))
}

/// 1-based index of the worker thread running the current evaluation.
pub fn current_instance() -> usize {
    rayon::current_thread_index().map_or(1, |i| i + 1)
}

/// A fully built invocation of the objective program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn build(executable: &Executable, instance: usize, names: &[String], x: &[f64]) -> Self {
        let mut args = Vec::with_capacity(executable.leading.len() + 2 + x.len());
        args.extend(executable.leading.iter().cloned());
        args.push(instance.to_string());
        args.push(names_token(names));
        // `Display` for f64 is the shortest form that parses back to the same value.
        args.extend(x.iter().map(|v| v.to_string()));
        Self {
            program: executable.program.clone(),
            args,
        }
    }

    /// Process command with stdin closed and both output streams captured.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

fn needs_quotes(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"')
}

/// Shell-style rendering, for log lines only.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in std::iter::once(&self.program).chain(&self.args).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            if needs_quotes(part) {
                write!(f, "\"{}\"", part.replace('"', "\\\""))?;
            } else {
                write!(f, "{part}")?;
            }
        }
        Ok(())
    }
}
