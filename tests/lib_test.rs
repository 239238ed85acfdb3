//! Tests for top-level Laboratory API

use std::time::Duration;
use trueno_lab::experiment::Experiment;
use trueno_lab::{LabConfig, Laboratory, Point, Region, Status};

#[test]
fn test_laboratory_builder() {
    // Test Laboratory::builder() returns LaboratoryBuilder
    let _builder = Laboratory::builder();
}

#[test]
fn test_laboratory_builder_chain() {
    // Test method chaining
    let lab = Laboratory::builder()
        .assistant_name("Rosie")
        .poll_interval(Duration::from_millis(20))
        .speed_factor(1.5)
        .default_max_duration(Some(Duration::from_secs(2)))
        .build()
        .unwrap();
    assert_eq!(lab.assistant().name(), "Rosie");
    assert_eq!(lab.assistant().poll_interval(), Duration::from_millis(20));
    assert_eq!(lab.config().default_max_duration(), Some(Duration::from_secs(2)));
}

#[test]
fn test_laboratory_build_default() {
    let lab = Laboratory::builder().build();
    assert!(lab.is_ok(), "Laboratory build should succeed");
    let lab = lab.unwrap();
    assert_eq!(lab.assistant().name(), "George Jetson");
    assert!(lab.experiments().is_empty());
    assert_eq!(lab.overall_status(), Status::Done);
}

#[test]
fn test_laboratory_from_json_config() {
    let config = LabConfig::from_json_str(r#"{"assistant_name": "Hal", "poll_interval_ms": 5}"#).unwrap();
    let lab = Laboratory::builder().config(config).build().unwrap();
    assert_eq!(lab.assistant().name(), "Hal");
    assert!((lab.config().speed_factor - 1.0).abs() < f32::EPSILON);

    let zero_poll = LabConfig {
        poll_interval_ms: 0,
        ..LabConfig::default()
    };
    assert!(Laboratory::builder().config(zero_poll).build().is_err());
}

#[test]
fn test_queue_and_run_whole_lab() {
    let lab = Laboratory::builder()
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    for n in 1..=3_i64 {
        let id = lab.next_experiment_id();
        lab.add_experiment(
            Experiment::from_fn(id, |ctx| {
                ctx.write("double", ctx.read_i64("n") * 2)?;
                Ok(())
            })
            .with_input("n", n),
        )
        .unwrap();
    }
    assert_eq!(lab.queue_unfinished(), 3);
    assert_eq!(lab.queue_unfinished(), 0);
    lab.assistant().run().unwrap();
    assert_eq!(lab.overall_status(), Status::Done);
    assert_eq!(lab.queue_unfinished(), 0);

    let evens = lab.filter(&Region::new().add("n", [2]));
    assert_eq!(evens.len(), 1);
    assert_eq!(evens[0].read_i64("double"), 4);
    assert!(lab.get_experiment("missing", &Point::new()).is_err());
}

#[test]
fn test_logging_init_is_idempotent() {
    let _ = trueno_lab::logging::init();
    assert!(!trueno_lab::logging::init());
}
