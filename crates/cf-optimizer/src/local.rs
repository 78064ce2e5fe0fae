//! Bounded Nelder-Mead simplex search used for local refinement.

use crate::clip;

/// Options for a local refinement.
#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Stop once the spread of simplex values is at most this.
    pub f_tol: f64,
    /// Stop once the simplex collapses to this size (max-norm).
    pub x_tol: f64,
    /// Evaluation budget for one refinement.
    pub max_fev: usize,
    /// Initial simplex edge as a fraction of each bound's width.
    pub initial_step: f64,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            f_tol: 1e-8,
            x_tol: 1e-8,
            max_fev: 400,
            initial_step: 0.05,
        }
    }
}

/// Outcome of one local refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalResult {
    pub x: Vec<f64>,
    pub fun: f64,
    pub nfev: usize,
    pub converged: bool,
}

const ALPHA: f64 = 1.0; // reflection
const GAMMA: f64 = 2.0; // expansion
const RHO: f64 = 0.5; // contraction
const SIGMA: f64 = 0.5; // shrink

/// Minimize `f` from `x0`, keeping every trial point inside `bounds`.
///
/// `f0` is the already-known value at `x0`, if any; it saves one evaluation.
pub fn nelder_mead<F>(
    f: &F,
    x0: &[f64],
    f0: Option<f64>,
    bounds: &[(f64, f64)],
    options: &LocalOptions,
) -> LocalResult
where
    F: Fn(&[f64]) -> f64 + ?Sized,
{
    let n = x0.len();
    let mut nfev = 0;
    let eval = |x: &[f64], nfev: &mut usize| {
        *nfev += 1;
        f(x)
    };

    let mut start = x0.to_vec();
    clip(&mut start, bounds);
    let start_value = match f0 {
        Some(v) => v,
        None => eval(&start, &mut nfev),
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut values: Vec<f64> = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    values.push(start_value);

    for i in 0..n {
        let (lo, hi) = bounds[i];
        let step = options.initial_step * (hi - lo);
        let mut vertex = start.clone();
        vertex[i] = if vertex[i] + step <= hi {
            vertex[i] + step
        } else {
            vertex[i] - step
        };
        clip(&mut vertex, bounds);
        values.push(eval(&vertex, &mut nfev));
        simplex.push(vertex);
    }

    let mut converged = false;
    while nfev < options.max_fev {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let f_spread = values
            .iter()
            .skip(1)
            .map(|v| (v - values[0]).abs())
            .fold(0.0_f64, f64::max);
        let x_spread = simplex
            .iter()
            .skip(1)
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if f_spread <= options.f_tol || x_spread <= options.x_tol {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for vertex in &simplex[..n] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }

        let toward = |coef: f64, from: &[f64]| -> Vec<f64> {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(from)
                .map(|(c, w)| c + coef * (c - w))
                .collect();
            clip(&mut p, bounds);
            p
        };

        let reflected = toward(ALPHA, &simplex[n]);
        let reflected_value = eval(&reflected, &mut nfev);

        if reflected_value < values[0] {
            let expanded = toward(GAMMA, &simplex[n]);
            let expanded_value = eval(&expanded, &mut nfev);
            if expanded_value < reflected_value {
                simplex[n] = expanded;
                values[n] = expanded_value;
            } else {
                simplex[n] = reflected;
                values[n] = reflected_value;
            }
        } else if reflected_value < values[n - 1] {
            simplex[n] = reflected;
            values[n] = reflected_value;
        } else {
            let contracted = toward(-RHO, &simplex[n]);
            let contracted_value = eval(&contracted, &mut nfev);
            if contracted_value < values[n] {
                simplex[n] = contracted;
                values[n] = contracted_value;
            } else {
                let best = simplex[0].clone();
                for i in 1..=n {
                    for (x, b) in simplex[i].iter_mut().zip(&best) {
                        *x = b + SIGMA * (*x - b);
                    }
                    values[i] = eval(&simplex[i], &mut nfev);
                }
            }
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    LocalResult {
        x: simplex[best].clone(),
        fun: values[best],
        nfev,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_functions::sphere;

    #[test]
    fn converges_on_sphere() {
        let bounds = vec![(-5.0, 5.0), (-5.0, 5.0)];
        let opts = LocalOptions {
            max_fev: 2000,
            ..Default::default()
        };
        let result = nelder_mead(&sphere, &[2.0, -3.0], None, &bounds, &opts);
        assert!(result.converged);
        assert!(result.fun < 1e-6, "f = {}", result.fun);
    }

    #[test]
    fn stays_inside_bounds() {
        // Unconstrained minimum at (-10, -10) lies outside the box.
        let shifted = |x: &[f64]| (x[0] + 10.0).powi(2) + (x[1] + 10.0).powi(2);
        let bounds = vec![(-1.0, 1.0), (-1.0, 1.0)];
        let result = nelder_mead(&shifted, &[0.5, 0.5], None, &bounds, &LocalOptions::default());
        for (xi, (lo, hi)) in result.x.iter().zip(&bounds) {
            assert!(xi >= lo && xi <= hi);
        }
        assert!((result.x[0] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn loose_tolerance_stops_early() {
        let bounds = vec![(-5.0, 5.0)];
        let tight = nelder_mead(&sphere, &[3.0], None, &bounds, &LocalOptions::default());
        let loose_opts = LocalOptions {
            f_tol: 10.0,
            ..Default::default()
        };
        let loose = nelder_mead(&sphere, &[3.0], None, &bounds, &loose_opts);
        assert!(loose.converged);
        assert!(loose.nfev < tight.nfev);
    }

    #[test]
    fn budget_is_respected() {
        let bounds = vec![(-5.0, 5.0); 3];
        let opts = LocalOptions {
            max_fev: 20,
            f_tol: 0.0,
            x_tol: 0.0,
            ..Default::default()
        };
        let result = nelder_mead(&sphere, &[1.0, 2.0, 3.0], Some(14.0), &bounds, &opts);
        assert!(!result.converged);
        // The last iteration may overshoot by one reflect, one contract and n shrinks.
        assert!(result.nfev <= 20 + 2 + 3);
    }
}
