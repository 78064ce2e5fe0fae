use serde::{Deserialize, Serialize};

/// Result from a global optimization method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalResult {
    /// Best point found
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub fun: f64,
    /// Number of objective evaluations
    pub nfev: usize,
    /// Iterations or generations performed
    pub nit: usize,
    /// Whether the method's own stopping criterion was met
    pub converged: bool,
    pub message: String,
    /// Local minima, best first (partition+sample methods only)
    pub xl: Option<Vec<Vec<f64>>>,
    pub funl: Option<Vec<f64>>,
}
