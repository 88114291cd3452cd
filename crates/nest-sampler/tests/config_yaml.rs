use nest_core::NestError;
use nest_sampler::{SamplerConfig, SamplerVariant};
use tempfile::tempdir;

#[test]
fn yaml_overrides_merge_with_defaults() {
    let config = SamplerConfig::from_yaml_str(
        r#"
ensemble: 64
discard: 4
variant: phantom
engines: [galilean, chord, gibbs]
termination:
  tolerance: 1.0e-6
engine:
  step_out: true
seed_policy:
  master_seed: 99
"#,
    )
    .unwrap();
    assert_eq!(config.ensemble, 64);
    assert_eq!(config.discard, 4);
    assert_eq!(config.variant, SamplerVariant::Phantom);
    assert_eq!(config.engines.len(), 3);
    assert_eq!(config.termination.tolerance, 1.0e-6);
    assert_eq!(config.termination.min_iterations, 100);
    assert!(config.engine.step_out);
    assert_eq!(config.engine.nstep, 10);
    assert_eq!(config.seed_policy.master_seed, 99);
    assert_eq!(config.rate, 1.0);
}

#[test]
fn invalid_values_are_reported_with_codes() {
    let cases = [
        ("ensemble: 0", "ensemble"),
        ("ensemble: 10\ndiscard: 11", "discard"),
        ("rate: -1.0", "rate"),
        ("verbose: 9", "verbose"),
        ("max_size: 0", "max-size"),
        ("engines: [teleport]", "engine-name"),
        ("termination:\n  end: 0.0", "termination"),
        ("engine:\n  nstep: 0", "engine-budget"),
        ("ensemble: [1, 2]", "config-parse"),
    ];
    for (yaml, code) in cases {
        let err = SamplerConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, NestError::Config(_)), "{yaml}");
        assert_eq!(err.info().code, code, "{yaml}");
    }
}

#[test]
fn config_files_are_read_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    std::fs::write(&path, "ensemble: 12\nthreads: true\n").unwrap();
    let config = SamplerConfig::from_path(&path).unwrap();
    assert_eq!(config.ensemble, 12);
    assert!(config.threads);

    std::fs::write(&path, "discard: 0\n").unwrap();
    let err = SamplerConfig::from_path(&path).unwrap_err();
    assert_eq!(err.info().context.get("path"), Some(&path.display().to_string()));

    let err = SamplerConfig::from_path(&dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.info().code, "config-read");
}
