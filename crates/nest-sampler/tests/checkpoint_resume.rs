use std::path::Path;
use std::sync::Arc;

use nest_core::RngHandle;
use nest_model::{ErrorDistribution, GaussSumModel, Model, PolynomialModel, Prior, Problem};
use nest_sampler::{checkpoint_path, Checkpoint, NestedSampler, SamplerConfig};
use tempfile::tempdir;

fn quadratic_problem() -> Problem {
    let mut rng = RngHandle::from_seed(77);
    let xdata: Vec<f64> = (0..12).map(|i| -1.0 + i as f64 / 6.0).collect();
    let ydata: Vec<f64> = xdata
        .iter()
        .map(|x| 0.5 + x - 0.7 * x * x + 0.1 * rng.normal())
        .collect();
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(2).with_prior(Prior::uniform(-3.0, 3.0).unwrap()));
    Problem::classic(model, xdata, ydata).unwrap()
}

fn checkpoint_config(root: &Path) -> SamplerConfig {
    let mut config = SamplerConfig::default();
    config.ensemble = 16;
    config.discard = 2;
    config.verbose = 0;
    config.termination.min_iterations = 20;
    config.termination.max_iterations = 300;
    config.checkpoint.interval = 10;
    config.checkpoint.directory = Some(root.to_path_buf());
    config
}

fn distribution() -> ErrorDistribution {
    let mut dist = ErrorDistribution::gauss(0.1);
    dist.set_limits([0.01, 1.0]).unwrap();
    dist
}

#[test]
fn checkpoint_roundtrip_preserves_the_run() {
    let dir = tempdir().unwrap();
    let mut sampler =
        NestedSampler::new(quadratic_problem(), distribution(), checkpoint_config(dir.path())).unwrap();
    sampler.sample().unwrap();

    let path = checkpoint_path(dir.path(), 10);
    assert!(path.exists());
    let loaded = Checkpoint::load(&path).unwrap();
    assert_eq!(loaded.state.iteration, 10);
    assert_eq!(loaded.walkers.len(), 16);
    assert_eq!(loaded.config, *sampler.config());

    let copy = dir.path().join("copy").join("ckpt.json");
    loaded.store(&copy).unwrap();
    assert_eq!(Checkpoint::load(&copy).unwrap(), loaded);

    let summary = sampler.run_summary();
    assert!(summary.checkpoints.contains(&path));
    assert_eq!(summary.provenance.seed, sampler.config().seed_policy.master_seed);
}

#[test]
fn resumed_run_matches_the_uninterrupted_one() {
    let dir = tempdir().unwrap();
    let mut full =
        NestedSampler::new(quadratic_problem(), distribution(), checkpoint_config(dir.path())).unwrap();
    full.sample().unwrap();
    assert!(full.iteration() > 10);

    let checkpoint = Checkpoint::load(&checkpoint_path(dir.path(), 10)).unwrap();
    let mut resumed = NestedSampler::restore(quadratic_problem(), distribution(), checkpoint).unwrap();
    assert_eq!(resumed.iteration(), 10);
    resumed.sample().unwrap();

    assert_eq!(resumed.iteration(), full.iteration());
    assert_eq!(resumed.samples().digest(), full.samples().digest());
    assert_eq!(resumed.log_z().to_bits(), full.log_z().to_bits());
    assert_eq!(resumed.inserted(), full.inserted());
    assert_eq!(resumed.engine_reports(), full.engine_reports());
}

#[test]
fn corrupt_or_foreign_checkpoints_are_rejected() {
    let dir = tempdir().unwrap();
    let err = Checkpoint::load(&dir.path().join("missing.json")).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-read");

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    let err = Checkpoint::load(&garbage).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-parse");

    let mut sampler =
        NestedSampler::new(quadratic_problem(), distribution(), checkpoint_config(dir.path())).unwrap();
    sampler.sample().unwrap();
    let mut checkpoint = sampler.checkpoint();
    checkpoint.schema.major += 1;
    let future = dir.path().join("future.json");
    checkpoint.store(&future).unwrap();
    let err = Checkpoint::load(&future).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-schema");
}

#[test]
fn dynamic_models_cannot_be_restored() {
    let model: Arc<dyn Model> = Arc::new(GaussSumModel::new(
        1,
        [
            Prior::uniform(0.0, 2.0).unwrap(),
            Prior::uniform(-1.0, 1.0).unwrap(),
            Prior::uniform(0.1, 1.0).unwrap(),
        ],
        Prior::exponential(1.0).unwrap(),
    ));
    let problem = Problem::classic(model, vec![0.0, 0.5, 1.0], vec![1.0, 0.5, 0.1]).unwrap();
    let dir = tempdir().unwrap();
    let sampler = NestedSampler::new(quadratic_problem(), distribution(), checkpoint_config(dir.path())).unwrap();
    let err = NestedSampler::restore(problem, distribution(), sampler.checkpoint()).unwrap_err();
    assert_eq!(err.info().code, "checkpoint-dynamic");
}
