//! Dispatches a run to the chosen library algorithm and normalizes what it
//! returns.

use tracing::info;

use cf_optimizer::{
    differential_evolution, dual_annealing, shgo, AnnealingOptions, DeOptions, GlobalResult,
    SamplingMethod, ShgoOptions, WorkerPool,
};
use cf_types::{Algorithm, CfResult, RawResult, ShgoSettings};

fn shgo_options(settings: &ShgoSettings, sampling: SamplingMethod) -> ShgoOptions {
    ShgoOptions {
        sampling,
        samples: settings.samples,
        iterations: settings.iterations,
        f_tol: settings.tolerance,
        ..Default::default()
    }
}

/// Minimize `objective` over `bounds` with `algorithm`.
///
/// `objective` receives and returns internal (minimize-form) values and may be
/// called from several worker threads at once.
pub fn optimize<F>(objective: &F, bounds: &[(f64, f64)], algorithm: &Algorithm) -> CfResult<RawResult>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    info!(
        algorithm = algorithm.name(),
        workers = algorithm.workers(),
        dimensions = bounds.len(),
        "starting optimization"
    );

    let result: GlobalResult = match algorithm {
        Algorithm::PartitionSampleSobol(settings) => {
            let pool = WorkerPool::new(settings.workers)?;
            shgo(objective, bounds, &shgo_options(settings, SamplingMethod::Sobol), &pool)?
        }
        Algorithm::PartitionSampleSimplicial(settings) => {
            let pool = WorkerPool::new(settings.workers)?;
            shgo(objective, bounds, &shgo_options(settings, SamplingMethod::Simplicial), &pool)?
        }
        Algorithm::DifferentialEvolution(settings) => {
            let pool = WorkerPool::new(settings.workers)?;
            let options = DeOptions {
                tol: settings.tolerance,
                max_iterations: settings.max_iterations,
                population_multiplier: settings.population_multiplier,
                seed: settings.seed,
                ..Default::default()
            };
            differential_evolution(objective, bounds, &options, &pool)?
        }
        Algorithm::DualAnnealing(settings) => {
            let options = AnnealingOptions {
                max_iterations: settings.max_iterations,
                seed: settings.seed,
                ..Default::default()
            };
            dual_annealing(objective, bounds, &options)?
        }
    };

    info!(
        nfev = result.nfev,
        nit = result.nit,
        converged = result.converged,
        message = %result.message,
        "optimization finished"
    );

    Ok(RawResult {
        x: result.x,
        fun: result.fun,
        nfev: result.nfev,
        xl: result.xl,
        funl: result.funl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_types::{AnnealingSettings, CfError, DeSettings};

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn partition_variants_return_local_optima() {
        let bounds = vec![(-2.0, 2.0); 2];
        for algorithm in [
            Algorithm::PartitionSampleSobol(ShgoSettings {
                workers: 2,
                tolerance: 1e-6,
                samples: Some(32),
                iterations: 1,
            }),
            Algorithm::PartitionSampleSimplicial(ShgoSettings {
                tolerance: 1e-6,
                ..Default::default()
            }),
        ] {
            let raw = optimize(&sphere, &bounds, &algorithm).unwrap();
            assert!(raw.fun < 1e-3, "{}: f = {}", algorithm.name(), raw.fun);
            let funl = raw.funl.unwrap();
            assert_eq!(raw.xl.unwrap().len(), funl.len());
            assert_eq!(funl[0], raw.fun);
        }
    }

    #[test]
    fn other_variants_have_no_local_optima() {
        let bounds = vec![(-2.0, 2.0); 2];
        let de = Algorithm::DifferentialEvolution(DeSettings {
            workers: 2,
            tolerance: 1e-3,
            max_iterations: 200,
            seed: Some(1),
            ..Default::default()
        });
        let raw = optimize(&sphere, &bounds, &de).unwrap();
        assert!(raw.xl.is_none() && raw.funl.is_none());
        assert!(raw.fun < 1e-2);

        let da = Algorithm::DualAnnealing(AnnealingSettings {
            max_iterations: 20,
            seed: Some(1),
        });
        let raw = optimize(&sphere, &bounds, &da).unwrap();
        assert!(raw.xl.is_none());
        assert!(raw.fun < 1e-4);
    }

    #[test]
    fn library_errors_become_run_errors() {
        let err = optimize(&sphere, &[], &Algorithm::default()).unwrap_err();
        assert!(matches!(err, CfError::Algorithm(_)));
        assert!(!err.is_config());
    }
}
