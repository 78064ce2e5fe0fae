//! Extracts the objective value from a program's combined output.
//!
//! A value is reported on a single line as
//! `begin_output ... ans: <number> ... end_output`. Anything outside the
//! markers is ignored, so programs may print freely around them.

use regex::Regex;

use cf_types::{internal_error, CfResult};

const REGION_PATTERN: &str = r"begin_output(.*?)end_output";
const ANSWER_PATTERN: &str = r"ans:\s*(\S*)";
const NUMBER_PATTERN: &str = r"^[-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?$";

/// Outcome of scanning program output for a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Value(f64),
    NoMatch,
    /// A marked `ans:` that is not followed by a usable number.
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct OutputParser {
    region: Regex,
    answer: Regex,
    number: Regex,
}

impl OutputParser {
    pub fn new() -> CfResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| internal_error!("invalid output pattern: {e}"))
        };
        Ok(Self {
            region: compile(REGION_PATTERN)?,
            answer: compile(ANSWER_PATTERN)?,
            number: compile(NUMBER_PATTERN)?,
        })
    }

    /// Scan every marked region in order; the first valid number wins.
    pub fn parse(&self, text: &str) -> ParsedOutput {
        let mut malformed: Option<String> = None;

        for region in self.region.captures_iter(text) {
            let body = match region.get(1) {
                Some(m) => m.as_str(),
                None => continue,
            };
            let Some(caps) = self.answer.captures(body) else {
                continue;
            };
            // The whole token must be a number, never just its prefix.
            let token = &caps[1];
            if self.number.is_match(token) {
                if let Ok(v) = token.parse::<f64>() {
                    if v.is_finite() {
                        return ParsedOutput::Value(v);
                    }
                }
            }
            malformed.get_or_insert_with(|| token.to_string());
        }

        match malformed {
            Some(token) => ParsedOutput::Malformed(token),
            None => ParsedOutput::NoMatch,
        }
    }
}
