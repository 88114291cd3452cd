use nest_core::errors::{ErrorInfo, NestError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("walker", 3)
        .with_context("reason", "example")
}

#[test]
fn unsupported_combination_surface() {
    let err = NestError::UnsupportedCombination(sample_info("U001", "accuracy with laplace scale"));
    assert_eq!(err.info().code, "U001");
    assert!(err.info().context.contains_key("walker"));
    assert!(err.is_fatal());
}

#[test]
fn degenerate_likelihood_surface() {
    let err = NestError::DegenerateLikelihood(sample_info("D001", "no finite logL"));
    assert_eq!(err.info().code, "D001");
    assert!(err.to_string().contains("walker=3"));
}

#[test]
fn numeric_failure_is_recoverable() {
    let err = NestError::numeric("N001", "singular hessian");
    assert_eq!(err.info().code, "N001");
    assert!(!err.is_fatal());
}

#[test]
fn consistency_surface_carries_hint() {
    let err = NestError::ConsistencyMismatch(
        sample_info("C001", "stored logL differs").with_hint("check the model is deterministic"),
    );
    assert!(err.to_string().contains("hint: check the model"));
}

#[test]
fn worker_errors_fold_into_composite() {
    assert!(NestError::from_workers(Vec::new()).is_none());
    let composite = NestError::from_workers(vec![
        NestError::config("c1", "bad"),
        NestError::numeric("n1", "worse"),
    ])
    .unwrap();
    match &composite {
        NestError::Workers(info, causes) => {
            assert_eq!(info.context.get("count").map(String::as_str), Some("2"));
            assert_eq!(causes.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(composite.to_string().starts_with("2 worker(s) failed"));
}

#[test]
fn errors_round_trip_json() {
    let err = NestError::from_workers(vec![NestError::Serde(sample_info("S001", "schema"))]).unwrap();
    let json = serde_json::to_string(&err).expect("serialize");
    let decoded: NestError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, err);
}
