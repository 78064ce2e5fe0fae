//! Partition + sample global search in the spirit of simplicial homology
//! global optimization.
//!
//! The bounded space is sampled (Sobol points, or a simplicial subdivision of
//! the hypercube), a neighbourhood graph is built over the samples, every
//! sample lower than all of its neighbours becomes a minimizer candidate, and
//! each candidate is refined with a bounded Nelder-Mead search. All local
//! minima found are reported, best first.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use cf_types::AlgorithmError;

use crate::local::{nelder_mead, LocalOptions, LocalResult};
use crate::pool::WorkerPool;
use crate::result::GlobalResult;
use crate::sobol::Sobol;
use crate::check_bounds;

/// Default sampling points per iteration for Sobol sampling.
const DEFAULT_SOBOL_SAMPLES: usize = 128;
/// Default sampling points per iteration for simplicial sampling.
const DEFAULT_SIMPLICIAL_SAMPLES: usize = 100;
/// Hypercube corners are always sampled, so the dimension has to stay small.
pub const MAX_SIMPLICIAL_DIMENSIONS: usize = 12;
/// Refining past the centroid enumerates d! initial simplices.
const MAX_SIMPLICIAL_REFINE_DIMENSIONS: usize = 8;
/// Local minima closer than this (in unit-cube max-norm) are merged.
const MINIMA_MERGE_DISTANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMethod {
    Sobol,
    Simplicial,
}

#[derive(Debug, Clone)]
pub struct ShgoOptions {
    pub sampling: SamplingMethod,
    /// Sampling points per iteration; `None` picks a default per method.
    pub samples: Option<usize>,
    pub iterations: usize,
    /// Function tolerance of each local refinement.
    pub f_tol: f64,
    /// Evaluation budget of each local refinement; `None` scales with dimension.
    pub local_max_fev: Option<usize>,
}

impl Default for ShgoOptions {
    fn default() -> Self {
        Self {
            sampling: SamplingMethod::Simplicial,
            samples: None,
            iterations: 1,
            f_tol: 1e-8,
            local_max_fev: None,
        }
    }
}

/// Sampled points in unit-cube coordinates plus their objective values.
struct SampleSet {
    unit: Vec<Vec<f64>>,
    values: Vec<f64>,
    neighbours: Vec<BTreeSet<usize>>,
}

impl SampleSet {
    fn new() -> Self {
        Self {
            unit: Vec::new(),
            values: Vec::new(),
            neighbours: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.unit.len()
    }

    fn extend(&mut self, unit: Vec<Vec<f64>>, values: Vec<f64>) {
        for (u, v) in unit.into_iter().zip(values) {
            self.unit.push(u);
            self.values.push(v);
            self.neighbours.push(BTreeSet::new());
        }
    }

    fn connect(&mut self, a: usize, b: usize) {
        if a != b {
            self.neighbours[a].insert(b);
            self.neighbours[b].insert(a);
        }
    }

    /// Replace the graph with the edges of `simplices`.
    fn connect_simplices(&mut self, simplices: &[Vec<usize>]) {
        for set in &mut self.neighbours {
            set.clear();
        }
        for simplex in simplices {
            for (k, &a) in simplex.iter().enumerate() {
                for &b in &simplex[k + 1..] {
                    self.connect(a, b);
                }
            }
        }
    }

    /// Indices lower than every neighbour, best first.
    fn minimizers(&self) -> Vec<usize> {
        let mut found: Vec<usize> = (0..self.len())
            .filter(|&i| self.values[i].is_finite())
            .filter(|&i| {
                self.neighbours[i].iter().all(|&j| {
                    self.values[i] < self.values[j]
                        || (self.values[i] == self.values[j] && i < j)
                })
            })
            .collect();
        found.sort_by(|&a, &b| self.values[a].total_cmp(&self.values[b]));
        found
    }
}

fn to_bounds(unit: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    unit.iter()
        .zip(bounds)
        .map(|(u, &(lo, hi))| lo + u * (hi - lo))
        .collect()
}

fn unit_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Minimize `f` over `bounds` by sampling, minimizer detection, and local refinement.
pub fn shgo<F>(
    f: &F,
    bounds: &[(f64, f64)],
    options: &ShgoOptions,
    pool: &WorkerPool,
) -> Result<GlobalResult, AlgorithmError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let algorithm = match options.sampling {
        SamplingMethod::Sobol => "shgo_sobol",
        SamplingMethod::Simplicial => "shgo_simplicial",
    };
    check_bounds(algorithm, bounds)?;
    let n = bounds.len();
    let iterations = options.iterations.max(1);

    let mut samples = SampleSet::new();
    match options.sampling {
        SamplingMethod::Sobol => {
            let per_iteration = options.samples.unwrap_or(DEFAULT_SOBOL_SAMPLES).max(1);
            sample_sobol(f, bounds, per_iteration * iterations, pool, &mut samples)?;
        }
        SamplingMethod::Simplicial => {
            let per_iteration = options.samples.unwrap_or(DEFAULT_SIMPLICIAL_SAMPLES).max(1);
            sample_simplicial(f, bounds, per_iteration * iterations, pool, &mut samples)?;
        }
    }
    let sample_fev = samples.len();

    let candidates = samples.minimizers();
    debug!(
        algorithm,
        samples = sample_fev,
        candidates = candidates.len(),
        "sampling finished, refining minimizer candidates"
    );

    let local_opts = LocalOptions {
        f_tol: options.f_tol,
        max_fev: options.local_max_fev.unwrap_or(100 * (n + 1)),
        ..Default::default()
    };
    let refined: Vec<LocalResult> = pool.map(&candidates, |&i| {
        let start = to_bounds(&samples.unit[i], bounds);
        nelder_mead(f, &start, Some(samples.values[i]), bounds, &local_opts)
    });
    let local_fev: usize = refined.iter().map(|r| r.nfev).sum();

    let mut minima: Vec<LocalResult> = Vec::new();
    let mut ordered = refined;
    ordered.sort_by(|a, b| a.fun.total_cmp(&b.fun));
    for result in ordered {
        let unit: Vec<f64> = result
            .x
            .iter()
            .zip(bounds)
            .map(|(x, &(lo, hi))| (x - lo) / (hi - lo))
            .collect();
        let duplicate = minima.iter().any(|m| {
            let other: Vec<f64> = m
                .x
                .iter()
                .zip(bounds)
                .map(|(x, &(lo, hi))| (x - lo) / (hi - lo))
                .collect();
            unit_distance(&unit, &other) < MINIMA_MERGE_DISTANCE
        });
        if !duplicate {
            minima.push(result);
        }
    }

    let nfev = sample_fev + local_fev;
    let xl: Vec<Vec<f64>> = minima.iter().map(|m| m.x.clone()).collect();
    let funl: Vec<f64> = minima.iter().map(|m| m.fun).collect();

    let (x, fun, converged, message) = match minima.first() {
        Some(best) => (
            best.x.clone(),
            best.fun,
            true,
            format!("found {} local minima", minima.len()),
        ),
        None => {
            // Every sample failed; report the first sample so the shape stays uniform.
            let best = (0..samples.len())
                .min_by(|&a, &b| samples.values[a].total_cmp(&samples.values[b]))
                .unwrap_or(0);
            (
                to_bounds(&samples.unit[best], bounds),
                samples.values[best],
                false,
                "no finite objective values were sampled".to_string(),
            )
        }
    };

    Ok(GlobalResult {
        x,
        fun,
        nfev,
        nit: iterations,
        converged,
        message,
        xl: Some(xl),
        funl: Some(funl),
    })
}

// ---------------------------------------------------------------------------
// Sobol sampling
// ---------------------------------------------------------------------------

fn sample_sobol<F>(
    f: &F,
    bounds: &[(f64, f64)],
    count: usize,
    pool: &WorkerPool,
    samples: &mut SampleSet,
) -> Result<(), AlgorithmError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let n = bounds.len();
    let mut sobol = Sobol::new(n)?;
    let unit: Vec<Vec<f64>> = (0..count).map(|_| sobol.next_point()).collect();
    let points: Vec<Vec<f64>> = unit.iter().map(|u| to_bounds(u, bounds)).collect();
    let values = pool.evaluate(f, &points);
    samples.extend(unit, values);

    // k-nearest-neighbour graph stands in for a triangulation of the samples.
    let k = (2 * n + 2).min(samples.len().saturating_sub(1));
    for i in 0..samples.len() {
        let mut by_distance: Vec<(f64, usize)> = (0..samples.len())
            .filter(|&j| j != i)
            .map(|j| (squared_distance(&samples.unit[i], &samples.unit[j]), j))
            .collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for &(_, j) in by_distance.iter().take(k) {
            samples.connect(i, j);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Simplicial sampling
// ---------------------------------------------------------------------------

/// Key for de-duplicating vertices produced by different bisections.
fn vertex_key(unit: &[f64]) -> Vec<u64> {
    unit.iter().map(|u| u.to_bits()).collect()
}

/// Kuhn triangulation of the unit cube: one simplex per axis permutation.
fn kuhn_simplices(n: usize) -> Vec<Vec<usize>> {
    let mut perms: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..n).collect();
    permute(&mut current, 0, &mut perms);
    perms
        .into_iter()
        .map(|perm| {
            let mut mask = 0usize;
            let mut simplex = vec![mask];
            for axis in perm {
                mask |= 1 << axis;
                simplex.push(mask);
            }
            simplex
        })
        .collect()
}

fn permute(items: &mut Vec<usize>, k: usize, out: &mut Vec<Vec<usize>>) {
    if k == items.len() {
        out.push(items.clone());
        return;
    }
    for i in k..items.len() {
        items.swap(k, i);
        permute(items, k + 1, out);
        items.swap(k, i);
    }
}

fn sample_simplicial<F>(
    f: &F,
    bounds: &[(f64, f64)],
    budget: usize,
    pool: &WorkerPool,
    samples: &mut SampleSet,
) -> Result<(), AlgorithmError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let n = bounds.len();
    if n > MAX_SIMPLICIAL_DIMENSIONS {
        return Err(AlgorithmError::UnsupportedDimension {
            algorithm: "shgo_simplicial",
            dimensions: n,
            max: MAX_SIMPLICIAL_DIMENSIONS,
        });
    }

    // Corner `mask` has coordinate i at the upper bound when bit i is set.
    let corner_count = 1usize << n;
    let mut unit: Vec<Vec<f64>> = (0..corner_count)
        .map(|mask| {
            (0..n)
                .map(|i| if mask & (1 << i) != 0 { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();
    unit.push(vec![0.5; n]);
    let centroid = corner_count;

    let points: Vec<Vec<f64>> = unit.iter().map(|u| to_bounds(u, bounds)).collect();
    let values = pool.evaluate(f, &points);
    let mut index: HashMap<Vec<u64>, usize> = unit
        .iter()
        .enumerate()
        .map(|(i, u)| (vertex_key(u), i))
        .collect();
    samples.extend(unit, values);

    for mask in 0..corner_count {
        for i in 0..n {
            samples.connect(mask, mask ^ (1 << i));
        }
        samples.connect(mask, centroid);
    }

    if samples.len() >= budget {
        return Ok(());
    }
    if n > MAX_SIMPLICIAL_REFINE_DIMENSIONS {
        return Err(AlgorithmError::UnsupportedDimension {
            algorithm: "shgo_simplicial refinement",
            dimensions: n,
            max: MAX_SIMPLICIAL_REFINE_DIMENSIONS,
        });
    }

    let mut level = kuhn_simplices(n);
    while samples.len() < budget {
        // Longest edge of every simplex, first pair wins ties.
        let edges: Vec<(usize, usize)> = level
            .iter()
            .map(|simplex| {
                let mut best = (simplex[0], simplex[1]);
                let mut best_len = f64::NEG_INFINITY;
                for a in 0..simplex.len() {
                    for b in (a + 1)..simplex.len() {
                        let len =
                            squared_distance(&samples.unit[simplex[a]], &samples.unit[simplex[b]]);
                        if len > best_len {
                            best_len = len;
                            best = (simplex[a], simplex[b]);
                        }
                    }
                }
                best
            })
            .collect();

        let mut fresh: Vec<Vec<f64>> = Vec::new();
        let mut fresh_keys: HashMap<Vec<u64>, usize> = HashMap::new();
        let room = budget - samples.len();
        for &(a, b) in &edges {
            let mid: Vec<f64> = samples.unit[a]
                .iter()
                .zip(&samples.unit[b])
                .map(|(x, y)| (x + y) / 2.0)
                .collect();
            let key = vertex_key(&mid);
            if index.contains_key(&key) || fresh_keys.contains_key(&key) || fresh.len() >= room {
                continue;
            }
            fresh_keys.insert(key, samples.len() + fresh.len());
            fresh.push(mid);
        }

        if !fresh.is_empty() {
            let points: Vec<Vec<f64>> = fresh.iter().map(|u| to_bounds(u, bounds)).collect();
            let values = pool.evaluate(f, &points);
            index.extend(fresh_keys);
            samples.extend(fresh, values);
        }

        let mut next = Vec::with_capacity(level.len() * 2);
        let mut split_any = false;
        for (simplex, &(a, b)) in level.into_iter().zip(&edges) {
            let mid: Vec<f64> = samples.unit[a]
                .iter()
                .zip(&samples.unit[b])
                .map(|(x, y)| (x + y) / 2.0)
                .collect();
            match index.get(&vertex_key(&mid)) {
                Some(&m) => {
                    split_any = true;
                    let left: Vec<usize> = simplex.iter().map(|&v| if v == b { m } else { v }).collect();
                    let right: Vec<usize> = simplex.iter().map(|&v| if v == a { m } else { v }).collect();
                    next.push(left);
                    next.push(right);
                }
                None => next.push(simplex),
            }
        }
        level = next;
        if !split_any {
            break;
        }
    }

    // A bisected edge no longer joins its endpoints.
    samples.connect_simplices(&level);
    Ok(())
}
