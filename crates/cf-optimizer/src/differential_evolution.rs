//! Differential evolution (`best1bin`) with deferred updating.
//!
//! Every generation builds all trial vectors first and evaluates them as one
//! batch, so a generation maps onto a single parallel pass over the pool.

use rand::seq::index;
use rand::Rng;
use tracing::debug;

use cf_types::AlgorithmError;

use crate::pool::WorkerPool;
use crate::result::GlobalResult;
use crate::{check_bounds, make_rng};

#[derive(Debug, Clone)]
pub struct DeOptions {
    /// Stop once the standard deviation of population energies is at most this.
    pub tol: f64,
    pub max_iterations: usize,
    /// Population size is this times the number of variables.
    pub population_multiplier: usize,
    /// Mutation factor drawn uniformly from this range once per generation.
    pub mutation: (f64, f64),
    pub recombination: f64,
    pub seed: Option<u64>,
}

impl Default for DeOptions {
    fn default() -> Self {
        Self {
            tol: 0.01,
            max_iterations: 1000,
            population_multiplier: 15,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            seed: None,
        }
    }
}

fn population_spread(energies: &[f64]) -> f64 {
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let var = energies.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / n;
    var.sqrt()
}

fn best_index(energies: &[f64]) -> usize {
    (0..energies.len())
        .min_by(|&a, &b| energies[a].total_cmp(&energies[b]))
        .unwrap_or(0)
}

/// Minimize `f` over `bounds` with differential evolution.
pub fn differential_evolution<F>(
    f: &F,
    bounds: &[(f64, f64)],
    options: &DeOptions,
    pool: &WorkerPool,
) -> Result<GlobalResult, AlgorithmError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    check_bounds("differential_evolution", bounds)?;
    let n = bounds.len();
    let pop_size = (options.population_multiplier * n).max(5);
    let mut rng = make_rng(options.seed);

    // Latin hypercube: each axis split into pop_size strata, one point per stratum.
    let mut population = vec![vec![0.0; n]; pop_size];
    for (j, &(lo, hi)) in bounds.iter().enumerate() {
        let strata = index::sample(&mut rng, pop_size, pop_size);
        for (i, stratum) in strata.iter().enumerate() {
            let u = (stratum as f64 + rng.gen::<f64>()) / pop_size as f64;
            population[i][j] = lo + u * (hi - lo);
        }
    }

    let mut energies = pool.evaluate(f, &population);
    let mut nfev = pop_size;
    let mut best = best_index(&energies);

    let (lo_mut, hi_mut) = options.mutation;
    let mut nit = 0;
    let mut converged = false;

    while nit < options.max_iterations {
        nit += 1;
        let scale = if hi_mut > lo_mut {
            rng.gen_range(lo_mut..hi_mut)
        } else {
            lo_mut
        };

        let trials: Vec<Vec<f64>> = (0..pop_size)
            .map(|i| {
                let picks = index::sample(&mut rng, pop_size - 1, 2);
                let r: Vec<usize> = picks.iter().map(|k| if k >= i { k + 1 } else { k }).collect();
                let fill_point = rng.gen_range(0..n);
                (0..n)
                    .map(|j| {
                        if j == fill_point || rng.gen::<f64>() < options.recombination {
                            let v = population[best][j]
                                + scale * (population[r[0]][j] - population[r[1]][j]);
                            let (lo, hi) = bounds[j];
                            if v < lo || v > hi {
                                rng.gen_range(lo..hi)
                            } else {
                                v
                            }
                        } else {
                            population[i][j]
                        }
                    })
                    .collect()
            })
            .collect();

        let trial_energies = pool.evaluate(f, &trials);
        nfev += pop_size;

        for (i, (trial, energy)) in trials.into_iter().zip(trial_energies).enumerate() {
            if energy < energies[i] {
                population[i] = trial;
                energies[i] = energy;
            }
        }
        best = best_index(&energies);

        let spread = population_spread(&energies);
        debug!(generation = nit, best = energies[best], spread, "generation finished");
        if spread <= options.tol {
            converged = true;
            break;
        }
    }

    let message = if converged {
        "population energies converged".to_string()
    } else {
        "maximum number of iterations reached".to_string()
    };

    Ok(GlobalResult {
        x: population[best].clone(),
        fun: energies[best],
        nfev,
        nit,
        converged,
        message,
        xl: None,
        funl: None,
    })
}
