use std::collections::BTreeMap;
use std::sync::Arc;

use nest_core::{log_sum_exp, NestError, RngHandle};
use nest_model::{ErrorDistribution, Model, PolynomialModel, Prior, Problem};
use nest_sampler::{checkpoint_path, Checkpoint, NestedSampler, SamplerConfig, SamplerVariant};
use proptest::prelude::*;
use tempfile::tempdir;

fn line_problem(seed: u64) -> Problem {
    let mut rng = RngHandle::from_seed(seed);
    let xdata: Vec<f64> = (0..15).map(|i| i as f64 * 0.5).collect();
    let ydata: Vec<f64> = xdata.iter().map(|x| 0.3 - 0.4 * x + 0.5 * rng.normal()).collect();
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-4.0, 4.0).unwrap()));
    Problem::classic(model, xdata, ydata).unwrap()
}

fn small_config(seed: u64) -> SamplerConfig {
    let mut config = SamplerConfig::default();
    config.ensemble = 20;
    config.verbose = 0;
    config.termination.min_iterations = 10;
    config.termination.max_iterations = 400;
    config.seed_policy.master_seed = seed;
    config
}

fn run(config: SamplerConfig) -> NestedSampler {
    let mut sampler = NestedSampler::new(line_problem(1), ErrorDistribution::gauss(0.5), config).unwrap();
    sampler.sample().unwrap();
    sampler
}

#[test]
fn evicting_the_whole_ensemble_averages_the_likelihood() {
    let mut config = small_config(4);
    config.discard = config.ensemble;
    let sampler = run(config);
    assert_eq!(sampler.iteration(), 1);
    assert_eq!(sampler.samples().len(), 20);
    let log_ls: Vec<f64> = sampler.samples().iter().map(|s| s.log_l).collect();
    let expected = log_sum_exp(&log_ls) - 20f64.ln();
    assert!((sampler.log_z() - expected).abs() < 1e-9);

    let mut single = small_config(4);
    single.ensemble = 1;
    single.discard = 1;
    let sampler = run(single);
    assert_eq!(sampler.samples().len(), 1);
    let only = sampler.samples().get(0).unwrap();
    assert!((sampler.log_z() - only.log_l).abs() < 1e-9);
    assert!(only.log_w.abs() < 1e-12);
}

#[test]
fn log_evidence_never_decreases() {
    let dir = tempdir().unwrap();
    let mut config = small_config(8);
    config.checkpoint.interval = 1;
    config.checkpoint.directory = Some(dir.path().to_path_buf());
    let sampler = run(config);

    let mut previous = f64::NEG_INFINITY;
    for iteration in 1..=sampler.iteration() {
        let checkpoint = Checkpoint::load(&checkpoint_path(dir.path(), iteration)).unwrap();
        assert_eq!(checkpoint.walkers.len(), 20);
        assert_eq!(checkpoint.state.iteration, iteration);
        assert!(checkpoint.state.log_z >= previous);
        assert!(checkpoint.state.info >= 0.0);
        previous = checkpoint.state.log_z;
    }
    assert!(sampler.log_z() >= previous);
    assert_eq!(sampler.run_summary().checkpoints.len(), sampler.iteration());
}

#[test]
fn threaded_exploration_reproduces_the_sequential_run() {
    let mut config = small_config(17);
    config.discard = 3;
    let sequential = run(config.clone());
    config.threads = true;
    let threaded = run(config);
    assert_eq!(sequential.samples().digest(), threaded.samples().digest());
    assert_eq!(sequential.log_z().to_bits(), threaded.log_z().to_bits());
    assert_eq!(sequential.engine_reports(), threaded.engine_reports());
}

#[test]
fn phantom_variant_drains_extra_samples() {
    let mut config = small_config(23);
    config.variant = SamplerVariant::Phantom;
    let phantom = run(config);
    assert!(phantom.samples().len() > phantom.iteration() + phantom.walkers().len());
    assert!(phantom.log_z().is_finite());
    assert!(phantom.info() >= 0.0);
    let total: f64 = phantom.samples().weights().iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn kept_parameters_stay_pinned() {
    let mut keep = BTreeMap::new();
    keep.insert(0, 0.3);
    let mut distribution = ErrorDistribution::gauss(1.0);
    distribution.set_limits([0.05, 5.0]).unwrap();
    keep.insert(2, 0.5);
    let mut sampler = NestedSampler::new(line_problem(1), distribution, small_config(29))
        .unwrap()
        .with_keep(keep)
        .unwrap();
    sampler.sample().unwrap();
    assert!(sampler.distribution().hyper_fit_index().is_empty());
    for sample in sampler.samples().iter() {
        assert_eq!(sample.params[0], 0.3);
        assert_eq!(sample.hypars[0], 0.5);
    }
}

#[test]
fn keep_is_refused_for_order_problems() {
    let problem = Problem::order(vec![0.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]).unwrap();
    let mut keep = BTreeMap::new();
    keep.insert(0, 1.0);
    let err = NestedSampler::new(problem, ErrorDistribution::distance(), small_config(1))
        .unwrap()
        .with_keep(keep)
        .unwrap_err();
    assert_eq!(err.info().code, "keep-order");
}

#[test]
fn invalid_combinations_are_rejected_up_front() {
    let mut config = small_config(1);
    config.engines = vec!["birth".to_string()];
    let err = NestedSampler::new(line_problem(1), ErrorDistribution::gauss(1.0), config).unwrap_err();
    assert!(matches!(err, NestError::UnsupportedCombination(_)));
    assert_eq!(err.info().code, "engine-problem");

    let bare: Arc<dyn Model> = Arc::new(PolynomialModel::new(1));
    let problem = Problem::classic(bare, vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
    let mut sampler = NestedSampler::new(problem, ErrorDistribution::gauss(1.0), small_config(1)).unwrap();
    let err = sampler.sample().unwrap_err();
    assert_eq!(err.info().code, "missing-prior");
}

#[test]
fn consistency_check_passes_on_an_honest_run() {
    let mut config = small_config(31);
    config.consistency_check = true;
    config.engines = vec!["galilean".into(), "chord".into(), "gibbs".into(), "step".into()];
    let sampler = run(config);
    assert!(sampler.log_z().is_finite());
    let reports = sampler.engine_reports();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.ncalls > 0));
}

#[test]
fn best_boost_reports_its_counters() {
    let mut config = small_config(37);
    config.best_boost = true;
    let mut sampler = NestedSampler::new(line_problem(2), ErrorDistribution::gauss(0.5), config)
        .unwrap()
        .with_fitter(Arc::new(nest_model::LevenbergMarquardt::default()));
    sampler.sample().unwrap();
    let reports = sampler.engine_reports();
    let boost = reports.iter().find(|r| r.name == "boost").unwrap();
    assert!(boost.best <= boost.success);
    assert!(sampler.run_summary().acceptance_rates.contains_key("boost"));
}

#[test]
fn sampling_twice_returns_the_same_evidence() {
    let mut sampler =
        NestedSampler::new(line_problem(3), ErrorDistribution::gauss(0.5), small_config(41)).unwrap();
    let first = sampler.sample().unwrap();
    let count = sampler.samples().len();
    let second = sampler.sample().unwrap();
    assert_eq!(first.to_bits(), second.to_bits());
    assert_eq!(count, sampler.samples().len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn runs_keep_the_ensemble_and_normalise(seed in any::<u64>(), discard in 1usize..5) {
        let mut config = small_config(seed);
        config.discard = discard;
        config.max_size = Some(150);
        let sampler = run(config);
        prop_assert_eq!(sampler.walkers().len(), 20);
        prop_assert!(sampler.samples().len() <= 150 + 20 + discard);
        let total: f64 = sampler.samples().weights().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-9);
        prop_assert!(sampler.info() >= 0.0);
        let inserted: usize = sampler.inserted().iter().sum();
        prop_assert_eq!(inserted, sampler.iteration() * discard);
        prop_assert_eq!(sampler.inserted().len(), 20 - discard + 1);
    }
}
