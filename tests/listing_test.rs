//! Integration tests for job history pagination and queries

use job_broker::core::{
    get_all_jobs, get_all_jobs_paged, get_queued_jobs, DocumentStore, Job, JobRequest, Services, State, Tenant,
    JOBS_DOCTYPE,
};
use job_broker::infra::{InMemoryHub, InMemoryStore};
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn tenant() -> Tenant {
    Tenant::new("alice.example.net")
}

/// Store `count` jobs directly, bypassing the hub.
async fn seed(store: &InMemoryStore, count: usize, worker: &str, state: State) {
    for _ in 0..count {
        let mut job = Job::new(&tenant(), JobRequest::new(worker));
        job.state = state;
        let doc = serde_json::to_value(&job).expect("encode job");
        store.create_doc(&tenant(), JOBS_DOCTYPE, doc).await.expect("create");
    }
}

fn setup() -> (Services, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    (Services::new(store.clone(), Arc::new(InMemoryHub::new())), store)
}

fn assert_each_once(jobs: &[Job], expected: usize) {
    let ids: HashSet<&str> = jobs.iter().map(Job::id).collect();
    assert_eq!(jobs.len(), expected, "every job listed");
    assert_eq!(ids.len(), expected, "no job listed twice");
}

// ============================================================================
// TESTS
// ============================================================================

/// Walking pages visits each document exactly once around page boundaries
#[tokio::test]
async fn test_paging_around_page_boundaries() {
    for count in [0, 1, 2, 4, 5, 6, 9, 10, 11, 23] {
        let (svc, store) = setup();
        seed(&store, count, "thumbnail", State::Done).await;

        let jobs = get_all_jobs_paged(&svc, &tenant(), 5).await.expect("list");
        assert_each_once(&jobs, count);

        let ids: Vec<&str> = jobs.iter().map(Job::id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "jobs listed in id order ({count} jobs)");
    }
}

/// The default page size handles a tenant history larger than one page
#[tokio::test]
async fn test_get_all_jobs_above_one_page() {
    let (svc, store) = setup();
    seed(&store, 10_002, "thumbnail", State::Done).await;

    let jobs = get_all_jobs(&svc, &tenant()).await.expect("list");
    assert_each_once(&jobs, 10_002);
}

/// A history of exactly one page is returned whole
#[tokio::test]
async fn test_get_all_jobs_exactly_one_page() {
    let (svc, store) = setup();
    seed(&store, 10_001, "thumbnail", State::Done).await;

    let jobs = get_all_jobs(&svc, &tenant()).await.expect("list");
    assert_each_once(&jobs, 10_001);
}

/// Queued and running jobs of the requested worker only
#[tokio::test]
async fn test_queued_jobs_selection() {
    let (svc, store) = setup();
    seed(&store, 2, "thumbnail", State::Queued).await;
    seed(&store, 1, "thumbnail", State::Running).await;
    seed(&store, 3, "thumbnail", State::Done).await;
    seed(&store, 4, "sendmail", State::Queued).await;

    let jobs = get_queued_jobs(&svc, &tenant(), "thumbnail").await.expect("queued");
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|job| job.worker_type == "thumbnail"));
    assert!(jobs.iter().all(|job| matches!(job.state, State::Queued | State::Running)));
}

/// Queued jobs are capped
#[tokio::test]
async fn test_queued_jobs_limit() {
    let (svc, store) = setup();
    seed(&store, 250, "thumbnail", State::Queued).await;

    let jobs = get_queued_jobs(&svc, &tenant(), "thumbnail").await.expect("queued");
    assert_eq!(jobs.len(), job_broker::core::listing::QUEUED_JOBS_LIMIT);
}
