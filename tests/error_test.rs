//! Tests for error types

use trueno_lab::experiment::{ExperimentError, ExperimentId, CANCELLED_MESSAGE};
use trueno_lab::table::TableId;
use trueno_lab::{ClaimId, Error};

#[test]
fn test_invalid_path_error() {
    let error = Error::InvalidPath("a..b".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid parameter path"));
    assert!(error_str.contains("a..b"));
    assert!(error_str.contains("a.b[2]"));
}

#[test]
fn test_invalid_datapoint_error() {
    let error = Error::InvalidDatapoint("Q7".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid datapoint identifier"));
    assert!(error_str.contains("T3:2:0"));
}

#[test]
fn test_input_already_set_error() {
    let error = Error::InputAlreadySet { key: "n".to_string() };
    let error_str = format!("{error}");
    assert!(error_str.contains("`n` is already set"));
    assert!(error_str.contains("write-once"));
}

#[test]
fn test_unknown_subject_errors() {
    assert!(format!("{}", Error::UnknownExperiment(ExperimentId::new(7))).contains("E7"));
    assert!(format!("{}", Error::UnknownTable(TableId::new(3))).contains("T3"));
    assert!(format!("{}", Error::UnknownClaim(ClaimId::new(1))).contains("C1"));
}

#[test]
fn test_run_lifetime_errors() {
    let interrupted = Error::RunInterrupted(ExperimentId::new(4));
    assert!(format!("{interrupted}").contains("E4"));
    assert!(format!("{interrupted}").contains("discarded"));
    assert_eq!(ExperimentError::from(interrupted), ExperimentError::Interrupted);

    let duplicate = Error::DuplicateExperiment(ExperimentId::new(2));
    assert!(format!("{duplicate}").contains("Duplicate experiment id: E2"));
    assert!(matches!(ExperimentError::from(duplicate), ExperimentError::Failed(_)));
}

#[test]
fn test_unknown_kind_error() {
    let error = Error::UnknownKind("sort".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Unknown experiment kind: sort"));
    assert!(error_str.contains("register_factory"));
}

#[test]
fn test_missing_column_error() {
    let error = Error::MissingColumn("time".to_string());
    assert!(format!("{error}").contains("Missing column: time"));
}

#[test]
fn test_scheduler_busy_error() {
    let error_str = format!("{}", Error::SchedulerBusy);
    assert!(error_str.contains("already running"));
    assert!(error_str.contains("stop()"));
}

#[test]
fn test_worker_and_config_errors() {
    assert!(format!("{}", Error::WorkerSpawn("EAGAIN".to_string())).contains("EAGAIN"));
    assert!(format!("{}", Error::InvalidConfig("speed".to_string())).contains("Invalid configuration"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    assert_eq!(format!("{error}"), "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::SchedulerBusy;
    assert!(format!("{error:?}").contains("SchedulerBusy"));
}

#[test]
fn test_experiment_error_conversions() {
    let from_lab: ExperimentError = Error::MissingColumn("x".to_string()).into();
    assert!(matches!(&from_lab, ExperimentError::Failed(m) if m.contains("Missing column")));

    let from_anyhow: ExperimentError = anyhow::anyhow!("disk full").context("writing trace").into();
    let msg = from_anyhow.to_string();
    assert!(msg.contains("writing trace"));
    assert!(msg.contains("disk full"));

    assert_eq!(ExperimentError::Interrupted.to_string(), CANCELLED_MESSAGE);
}
