use super::store::ModelStore;
use super::types::{Hyperparameters, ModelParams, Role};
use crate::logic::dataset::{Label, Payload, RawRecord};
use crate::logic::error::PipelineError;
use crate::logic::features::{FeatureEntry, TransformSpec};
use crate::logic::testutil::{config, extract, labeled_records, signal};
use tempfile::tempdir;

fn spec() -> TransformSpec {
    TransformSpec::new(128).with_channels(1)
}

fn budget() -> Hyperparameters {
    Hyperparameters::default()
        .with_epochs(30)
        .with_batch_size(4)
        .with_seed(3)
}

#[test]
fn test_detector_training_is_reproducible() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(6, 4, 160), &spec());
    let store = ModelStore::new(&cfg);

    let first = store.train(&set, Role::Detector, &budget()).unwrap();
    assert!(first.id.starts_with("md-"));
    assert_eq!(first.role, Role::Detector);
    assert_eq!(first.feature_set_id, set.id());
    assert_eq!(first.dataset_id, set.dataset_id());
    assert_eq!(first.transform_version, set.transform_version());
    assert_eq!(first.feature_dim, 128);
    assert!(matches!(first.params, ModelParams::Logistic { .. }));

    let history = &first.metrics.loss_history;
    assert!(history.last().unwrap() < &history[0]);

    // same seed, same feature set: same artifact id, reused from disk
    let second = store.train(&set, Role::Detector, &budget()).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.metrics, second.metrics);
    assert_eq!(store.list().unwrap().len(), 1);
    assert!(store.verify(&first.id).unwrap());

    // independent root
    let other_dir = tempdir().unwrap();
    let other_cfg = config(other_dir.path());
    let other_set = extract(&other_cfg, "sigs", &labeled_records(6, 4, 160), &spec());
    let third = ModelStore::new(&other_cfg)
        .train(&other_set, Role::Detector, &budget())
        .unwrap();
    assert_eq!(third.metrics, first.metrics);
    assert_eq!(third.params, first.params);
}

#[test]
fn test_different_seed_changes_run() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(6, 4, 160), &spec());
    let store = ModelStore::new(&cfg);

    let a = store.train(&set, Role::Detector, &budget()).unwrap();
    let b = store.train(&set, Role::Detector, &budget().with_seed(99)).unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(b.metrics.seed, 99);
}

#[test]
fn test_early_stop_records_convergence_warning() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(3, 3, 128), &spec());

    let hp = budget().with_patience(1, 1e3);
    let model = ModelStore::new(&cfg).train(&set, Role::Detector, &hp).unwrap();

    assert!(model.metrics.stopped_early);
    assert_eq!(model.metrics.epochs_run, 2);
    assert_eq!(model.metrics.warnings.len(), 1);
    assert_eq!(model.metrics.warnings[0].epoch, 2);
    assert_eq!(model.metrics.warnings[0].patience, 1);
}

#[test]
fn test_iteration_budget_is_respected() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(5, 5, 128), &spec());

    let hp = budget().with_batch_size(2).with_max_iterations(7);
    let model = ModelStore::new(&cfg).train(&set, Role::Detector, &hp).unwrap();

    assert_eq!(model.metrics.iterations, 7);
    assert_eq!(model.metrics.epochs_run, 2);
    assert!(!model.metrics.stopped_early);
}

#[test]
fn test_missing_labels_fail_and_persist_nothing() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let mut records = labeled_records(2, 2, 128);
    records.push(RawRecord::new(
        "unlabeled",
        Payload::Signal {
            samples: signal(9, 128, false),
        },
        None,
    ));
    let set = extract(&cfg, "partial", &records, &spec());
    let store = ModelStore::new(&cfg);

    match store.train(&set, Role::Detector, &budget()) {
        Err(PipelineError::Training(msg)) => assert!(msg.contains("unlabeled"), "{}", msg),
        other => panic!("Expected Training error, got {:?}", other.map(|m| m.id)),
    }
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_regressor_requires_timestamps() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let mut records = labeled_records(2, 2, 128);
    records[0].label = Some(Label::watermarked(true));
    let set = extract(&cfg, "no-ts", &records, &spec());

    let result = ModelStore::new(&cfg).train(&set, Role::TimestampRegressor, &budget());
    assert!(matches!(result, Err(PipelineError::Training(_))));
}

#[test]
fn test_regressor_stores_target_scale_and_error_bound() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(4, 4, 128), &spec());

    let hp = budget().with_learning_rate(0.001);
    let model = ModelStore::new(&cfg)
        .train(&set, Role::TimestampRegressor, &hp)
        .unwrap();

    match &model.params {
        ModelParams::Linear {
            target_mean,
            target_std,
            error_bound,
            ..
        } => {
            // timestamps 1_700_000_000 + i*60 for i in 0..8
            assert!((target_mean - 1_700_000_210.0).abs() < 1e-3);
            assert!(*target_std > 0.0);
            assert!(error_bound.is_finite() && *error_bound >= 0.0);
        }
        other => panic!("Expected Linear params, got {:?}", other),
    }
    let estimate = model.params.timestamp_estimate(&set.entries[0].values).unwrap();
    assert!(estimate.is_finite());
}

#[test]
fn test_diverging_loss_is_training_error() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(5, 5, 128), &spec());
    let store = ModelStore::new(&cfg);

    let hp = budget()
        .with_learning_rate(10.0)
        .with_batch_size(2)
        .with_epochs(200)
        .with_patience(0, 0.0);
    let result = store.train(&set, Role::TimestampRegressor, &hp);
    assert!(matches!(result, Err(PipelineError::Training(_))));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_generator_pattern_is_detectable_by_probe() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(0, 8, 128), &spec());

    let model = ModelStore::new(&cfg)
        .train(&set, Role::Generator, &budget())
        .unwrap();

    let clean = &set.entries[0].values;
    let embedded = model.params.embed(clean).unwrap();
    assert_eq!(embedded.len(), clean.len());
    assert_ne!(&embedded, clean);

    let p_clean = model.params.watermark_probability(clean).unwrap();
    let p_marked = model.params.watermark_probability(&embedded).unwrap();
    assert!(p_marked > p_clean);
}

#[test]
fn test_invalid_hyperparameters() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(2, 2, 128), &spec());
    let store = ModelStore::new(&cfg);

    for hp in [
        budget().with_epochs(0),
        budget().with_batch_size(0),
        budget().with_learning_rate(0.0),
        budget().with_learning_rate(f64::NAN),
        budget().with_max_iterations(0),
    ] {
        assert!(matches!(
            store.train(&set, Role::Detector, &hp),
            Err(PipelineError::Training(_))
        ));
    }
}

#[test]
fn test_inconsistent_dimension_and_empty_set() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let set = extract(&cfg, "sigs", &labeled_records(2, 2, 128), &spec());
    let store = ModelStore::new(&cfg);

    let mut ragged = set.clone();
    ragged.entries.push(FeatureEntry {
        record_id: "short".to_string(),
        window: 0,
        augmented: false,
        values: vec![0.5; 3],
        label: Some(Label::watermarked(true)),
    });
    assert!(matches!(
        store.train(&ragged, Role::Detector, &budget()),
        Err(PipelineError::Training(_))
    ));

    let mut empty = set.clone();
    empty.entries.clear();
    assert!(matches!(
        store.train(&empty, Role::Detector, &budget()),
        Err(PipelineError::Training(_))
    ));
}

#[test]
fn test_unknown_model_not_found() {
    let dir = tempdir().unwrap();
    let store = ModelStore::new(&config(dir.path()));
    assert!(matches!(
        store.load("md-0000000000000000"),
        Err(PipelineError::NotFound { .. })
    ));
}

#[test]
fn test_non_finite_weights_after_last_step_are_training_error() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let records: Vec<RawRecord> = (0..4)
        .map(|i| {
            RawRecord::new(
                format!("big-{}", i),
                Payload::Signal {
                    samples: vec![1e30; 8],
                },
                Some(Label::watermarked(true)),
            )
        })
        .collect();
    let set = extract(
        &cfg,
        "big",
        &records,
        &TransformSpec::new(8).with_normalize(false),
    );
    let store = ModelStore::new(&cfg);

    // the clamped cross-entropy stays finite while the single step overflows w
    let hp = Hyperparameters::default()
        .with_epochs(1)
        .with_learning_rate(1e290)
        .with_seed(1);
    match store.train(&set, Role::Detector, &hp) {
        Err(PipelineError::Training(msg)) => assert!(msg.contains("weights"), "{}", msg),
        other => panic!("Expected Training error, got {:?}", other.map(|m| m.id)),
    }
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_non_finite_field_names_the_parameter() {
    let finite = ModelParams::Logistic {
        weights: vec![0.5, -0.5],
        bias: 0.1,
    };
    assert_eq!(finite.non_finite_field(), None);

    let bad_bias = ModelParams::Logistic {
        weights: vec![0.5],
        bias: f64::NAN,
    };
    assert_eq!(bad_bias.non_finite_field(), Some("bias"));

    let bad_bound = ModelParams::Linear {
        weights: vec![1.0],
        bias: 0.0,
        target_mean: 0.0,
        target_std: 1.0,
        error_bound: f64::INFINITY,
    };
    assert_eq!(bad_bound.non_finite_field(), Some("error_bound"));

    let bad_generator = ModelParams::Generator {
        pattern: vec![0.1],
        strength: 0.1,
        probe_weights: vec![f64::NEG_INFINITY],
        probe_bias: 0.0,
    };
    assert_eq!(bad_generator.non_finite_field(), Some("probe_weights"));
}
