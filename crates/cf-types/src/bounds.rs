//! Search space definitions: named variables with numeric bounds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::CfResult;
use crate::{config_error, validation_error};

/// A single named dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name as passed to the external program (e.g. "x1").
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }
}

/// One row of the bounds table exactly as the operator typed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBound {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "crate::config::text_or_number")]
    pub lower: String,
    #[serde(default, deserialize_with = "crate::config::text_or_number")]
    pub upper: String,
}

impl RawBound {
    pub fn new(name: &str, lower: &str, upper: &str) -> Self {
        Self {
            name: name.to_string(),
            lower: lower.to_string(),
            upper: upper.to_string(),
        }
    }
}

/// The full search space: an ordered list of variables.
///
/// Order is significant: position `i` of every candidate vector and every
/// exported row refers to `variables[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundsSet {
    pub variables: Vec<Variable>,
}

impl BoundsSet {
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.variables.push(Variable::new(name, lower, upper));
        self
    }

    /// Build a bounds set from operator rows.
    ///
    /// Rows whose name is blank are discarded before anything else is checked;
    /// any remaining row with non-numeric bound text is a configuration error.
    pub fn from_rows(rows: &[RawBound]) -> CfResult<Self> {
        let mut set = Self::new();
        for row in rows {
            let name = row.name.trim();
            if name.is_empty() {
                continue;
            }
            let lower = parse_bound(name, "lower", &row.lower)?;
            let upper = parse_bound(name, "upper", &row.upper)?;
            set.variables.push(Variable::new(name, lower, upper));
        }
        set.validate()?;
        Ok(set)
    }

    /// Parse `name:lower:upper` (the CLI `--bound` form).
    pub fn parse_spec(spec: &str) -> CfResult<RawBound> {
        let parts: Vec<&str> = spec.rsplitn(3, ':').collect();
        match parts.as_slice() {
            [upper, lower, name] => Ok(RawBound::new(name, lower, upper)),
            _ => Err(config_error!(
                "variable `{spec}` must have the form name:lower:upper"
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// `(lower, upper)` pairs in order, the shape the algorithm library takes.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.variables.iter().map(|v| (v.lower, v.upper)).collect()
    }

    pub fn validate(&self) -> CfResult<()> {
        if self.variables.is_empty() {
            return Err(config_error!("no valid bounds data found"));
        }

        let mut seen = HashSet::new();
        for var in &self.variables {
            if !seen.insert(var.name.as_str()) {
                return Err(validation_error!("duplicate variable name `{}`", var.name));
            }
            if !var.lower.is_finite() || !var.upper.is_finite() {
                return Err(validation_error!(
                    "bounds of `{}` must be finite, got [{}, {}]",
                    var.name,
                    var.lower,
                    var.upper
                ));
            }
            if var.lower >= var.upper {
                return Err(validation_error!(
                    "lower bound of `{}` must be below its upper bound, got [{}, {}]",
                    var.name,
                    var.lower,
                    var.upper
                ));
            }
        }
        Ok(())
    }
}

fn parse_bound(name: &str, which: &str, text: &str) -> CfResult<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        config_error!("{which} bound of `{name}` is not a number: `{text}`")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CfError;

    fn eggholder_rows() -> Vec<RawBound> {
        let mut rows = vec![
            RawBound::new("x1", "-512", "512"),
            RawBound::new("x2", "-512", "512"),
        ];
        rows.extend((0..8).map(|_| RawBound::default()));
        rows
    }

    #[test]
    fn blank_rows_are_discarded() {
        let set = BoundsSet::from_rows(&eggholder_rows()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["x1".to_string(), "x2".to_string()]);
        assert_eq!(set.bounds(), vec![(-512.0, 512.0), (-512.0, 512.0)]);
    }

    #[test]
    fn empty_set_is_config_error() {
        let rows = vec![RawBound::default(), RawBound::new("  ", "1", "2")];
        let err = BoundsSet::from_rows(&rows).unwrap_err();
        assert!(matches!(err, CfError::Config(_)));
    }

    #[test]
    fn non_numeric_bound_is_config_error() {
        let rows = vec![RawBound::new("x1", "abc", "2")];
        let err = BoundsSet::from_rows(&rows).unwrap_err();
        assert!(matches!(err, CfError::Config(_)));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn inverted_and_duplicate_bounds_rejected() {
        let inverted = BoundsSet::new().add("x", 2.0, 1.0);
        assert!(matches!(inverted.validate(), Err(CfError::Validation(_))));

        let duplicate = BoundsSet::new().add("x", 0.0, 1.0).add("x", 0.0, 2.0);
        assert!(matches!(duplicate.validate(), Err(CfError::Validation(_))));

        let infinite = BoundsSet::new().add("x", f64::NEG_INFINITY, 1.0);
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn parse_spec_handles_negative_bounds() {
        let row = BoundsSet::parse_spec("x1:-512:512").unwrap();
        assert_eq!(row, RawBound::new("x1", "-512", "512"));
        assert!(BoundsSet::parse_spec("x1:-512").is_err());
    }
}
