//! # cf-optimizer
//!
//! Bounded, derivative-free global optimization for COFFEE.
//!
//! Every algorithm minimizes an objective `Fn(&[f64]) -> f64` over box bounds
//! and returns a [`GlobalResult`]. Objectives may be invoked concurrently from
//! a [`WorkerPool`], so they must be `Sync`.

mod differential_evolution;
mod dual_annealing;
mod local;
mod pool;
mod result;
mod shgo;
mod sobol;

pub use differential_evolution::{differential_evolution, DeOptions};
pub use dual_annealing::{dual_annealing, AnnealingOptions};
pub use local::{nelder_mead, LocalOptions, LocalResult};
pub use pool::WorkerPool;
pub use result::GlobalResult;
pub use shgo::{shgo, SamplingMethod, ShgoOptions};
pub use sobol::{Sobol, MAX_SOBOL_DIMENSIONS};

use cf_types::AlgorithmError;

/// Reject empty or degenerate bounds before any evaluation happens.
pub(crate) fn check_bounds(
    algorithm: &'static str,
    bounds: &[(f64, f64)],
) -> Result<(), AlgorithmError> {
    if bounds.is_empty() {
        return Err(AlgorithmError::EmptyBounds { algorithm });
    }
    for (index, &(lower, upper)) in bounds.iter().enumerate() {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(AlgorithmError::InvalidBounds {
                algorithm,
                index,
                lower,
                upper,
            });
        }
    }
    Ok(())
}

/// Project a point back into the box.
pub(crate) fn clip(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(lo, hi);
    }
}

/// Seeded generator when a seed is given, entropy otherwise.
pub(crate) fn make_rng(seed: Option<u64>) -> rand_chacha::ChaCha8Rng {
    use rand::SeedableRng;
    match seed {
        Some(seed) => rand_chacha::ChaCha8Rng::seed_from_u64(seed),
        None => rand_chacha::ChaCha8Rng::from_entropy(),
    }
}
