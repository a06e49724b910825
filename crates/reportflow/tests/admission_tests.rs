//! Admission and backpressure tests.

mod common;

use common::{ConfigBuilder, TestHarness};

use reportflow::admission::AdmissionError;
use reportflow::db::report_repo::ReportFilter;
use reportflow::db::Database;
use reportflow::model::{
    InputError, JobStatus, ReportStatus, SourcePriority, SourceType, SubmitRequest,
};
use reportflow::queue::WorkQueue;
use reportflow::StatusStore;

#[tokio::test]
async fn test_theme_only_submission_is_queued() {
    let harness = TestHarness::new();
    let outcome = harness.submit("SaaS HR market").await;

    let store = &harness.services.store;
    let report = store.report(&outcome.report_id).unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Queued);
    let job = store.job(&outcome.job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 0);

    let input = store.input(&outcome.report_id).unwrap().unwrap();
    assert_eq!(input.theme_text, "SaaS HR market");
    assert_eq!(input.source_priority, SourcePriority::default());
    assert!(input.fallback.is_auto());
    assert!(store.sections(&outcome.report_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_sixth_submission_hits_backpressure() {
    let harness = TestHarness::with_config(ConfigBuilder::new().max_running_jobs(5).build());
    let store = &harness.services.store;

    for i in 0..5 {
        let outcome = harness.submit(&format!("theme {}", i)).await;
        store.start_job(&outcome.job_id).unwrap();
    }

    let err = harness
        .services
        .admission
        .submit(&SubmitRequest::with_theme("one too many"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Backpressure {
            running: 5,
            limit: 5
        }
    ));

    let (_, total) = store.list_reports(&ReportFilter::default()).unwrap();
    assert_eq!(total, 5);
    assert_eq!(harness.services.queue.stats().await.unwrap().ready, 5);
}

#[tokio::test]
async fn test_queued_jobs_do_not_count_against_limit() {
    let harness = TestHarness::with_config(ConfigBuilder::new().max_running_jobs(1).build());
    harness.submit("first").await;
    harness.submit("second").await;
    assert_eq!(harness.services.queue.stats().await.unwrap().ready, 2);
}

#[tokio::test]
async fn test_running_count_is_read_from_the_database() {
    let harness = TestHarness::with_config(ConfigBuilder::new().max_running_jobs(1).build());
    let outcome = harness.submit("first").await;

    // A second process sharing the file marks the job running.
    let other = StatusStore::new(Database::open(&harness.db_path).unwrap());
    other.start_job(&outcome.job_id).unwrap();

    let err = harness
        .services
        .admission
        .submit(&SubmitRequest::with_theme("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::Backpressure { .. }));
}

#[tokio::test]
async fn test_missing_theme_rejected_without_side_effects() {
    let harness = TestHarness::new();
    for request in [
        SubmitRequest::default(),
        SubmitRequest::with_theme(""),
        SubmitRequest::with_theme(" \t\n"),
    ] {
        let err = harness.services.admission.submit(&request).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Invalid(InputError::MissingTheme)));
    }

    let (_, total) = harness
        .services
        .store
        .list_reports(&ReportFilter::default())
        .unwrap();
    assert_eq!(total, 0);
    assert_eq!(harness.services.queue.stats().await.unwrap().ready, 0);
}

#[tokio::test]
async fn test_unknown_source_token_rejected() {
    let harness = TestHarness::new();
    let request = SubmitRequest {
        source_priority: Some(vec!["web".into(), "podcast".into()]),
        ..SubmitRequest::with_theme("x")
    };
    let err = harness.services.admission.submit(&request).await.unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Invalid(InputError::UnknownSource(ref token)) if token == "podcast"
    ));
}

#[tokio::test]
async fn test_input_is_normalized() {
    let harness = TestHarness::new();
    let request = SubmitRequest {
        theme_text: Some("  Cold chain logistics  ".into()),
        region: Some("   ".into()),
        focus_points: Some(vec!["pricing".into(), "pricing".into(), "churn".into()]),
        source_priority: Some(vec!["YouTube".into(), "web".into()]),
        auto_fallback: Some(false),
        owner: Some("bob".into()),
        ..SubmitRequest::default()
    };
    let outcome = harness.services.admission.submit(&request).await.unwrap();

    let store = &harness.services.store;
    let input = store.input(&outcome.report_id).unwrap().unwrap();
    assert_eq!(input.theme_text, "Cold chain logistics");
    assert_eq!(input.region, None);
    assert_eq!(input.focus_points, vec!["pricing", "churn"]);
    assert_eq!(
        input.source_priority.sources(),
        &[SourceType::Video, SourceType::Web]
    );
    assert!(!input.fallback.is_auto());
    assert_eq!(store.report(&outcome.report_id).unwrap().unwrap().owner, "bob");
}

#[tokio::test]
async fn test_cancel_without_active_job_conflicts() {
    let harness = TestHarness::new();
    let outcome = harness.submit("x").await;
    harness.run_until_idle().await;

    let err = harness
        .services
        .admission
        .cancel(&outcome.report_id)
        .unwrap_err();
    assert!(matches!(err, AdmissionError::Conflict(_)));
}
