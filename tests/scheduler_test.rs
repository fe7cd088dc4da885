//! Results cycle behavior against in-memory fakes: recompute, republish,
//! per-entity isolation, and the no-overlap guarantee.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use anthranks::models::records::{
    COMPILED_TAB, METADATA_HEADER, METADATA_TAB, VOTES_HEADER, VOTES_TAB,
};
use anthranks::services::scheduler::compile_current;
use anthranks::services::{MetadataRepository, ResultsScheduler};

use common::{FakePlatform, FakeStore};

const COMPILED_HEADER: [&str; 3] = ["entity_id", "category", "score"];

fn store_with(metadata: Vec<Vec<&str>>, votes: Vec<Vec<&str>>) -> Arc<FakeStore> {
    let store = Arc::new(FakeStore::new());
    store.seed_tab(METADATA_TAB, &METADATA_HEADER, metadata);
    store.seed_tab(VOTES_TAB, &VOTES_HEADER, votes);
    store.seed_tab(COMPILED_TAB, &COMPILED_HEADER, vec![]);
    store
}

async fn scheduler_for(
    store: Arc<FakeStore>,
    platform: Arc<FakePlatform>,
) -> (Arc<ResultsScheduler>, Arc<MetadataRepository>) {
    let repo = Arc::new(MetadataRepository::new(store.clone()));
    repo.load_all().await.unwrap();
    let scheduler = Arc::new(ResultsScheduler::new(
        store,
        platform,
        Arc::clone(&repo),
        Duration::from_secs(45 * 60),
    ));
    (scheduler, repo)
}

#[tokio::test]
async fn cycle_edits_known_results_surface_with_fresh_scores() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", "3001"]],
        vec![
            vec!["u1", "dino_raptor", "Complexity", "2", "2026-03-01T10:00:00+00:00"],
            vec!["u2", "dino_raptor", "Complexity", "5", "2026-03-01T10:05:00+00:00"],
        ],
    );
    let platform = Arc::new(FakePlatform::new());
    let (scheduler, _repo) = scheduler_for(store, platform.clone()).await;

    scheduler.run_cycle().await.unwrap();

    let edits = platform.edits.lock().unwrap();
    assert_eq!(edits.len(), 1);
    let (thread_id, message_id, payload) = &edits[0];
    assert_eq!((*thread_id, *message_id), (1001, 3001));
    // Mean of 2 and 5 renders three and a half stars
    assert!(payload.fields[0].1.contains("★★★⯪☆"));
    assert!(platform.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeat_votes_by_one_user_collapse_to_latest() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", "3001"]],
        vec![
            vec!["u1", "dino_raptor", "Complexity", "1", "2026-03-01T10:00:00+00:00"],
            vec!["u1", "dino_raptor", "Complexity", "4", "2026-03-01T11:00:00+00:00"],
        ],
    );
    let platform = Arc::new(FakePlatform::new());
    let (scheduler, _repo) = scheduler_for(store, platform.clone()).await;

    scheduler.run_cycle().await.unwrap();

    let edits = platform.edits.lock().unwrap();
    assert!(edits[0].2.fields[0].1.contains("★★★★☆"));
}

#[tokio::test]
async fn cycle_posts_new_surface_and_records_its_id() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", ""]],
        vec![vec!["u1", "dino_raptor", "Complexity", "5", "2026-03-01T10:00:00+00:00"]],
    );
    let platform = Arc::new(FakePlatform::new());
    let (scheduler, repo) = scheduler_for(store.clone(), platform.clone()).await;
    repo.mark_results_pending("dino_raptor").await;

    scheduler.run_cycle().await.unwrap();

    assert_eq!(platform.posts.lock().unwrap().len(), 1);
    // New id written back to the existing row, no duplicate row
    let rows = store.rows(METADATA_TAB);
    assert_eq!(rows.len(), 2);
    assert!(!rows[1][3].is_empty());
    assert!(repo.pending_results().await.is_empty());
}

#[tokio::test]
async fn one_entity_failure_does_not_stop_the_cycle() {
    let store = store_with(
        vec![
            vec!["1001", "dino_raptor", "2001", "3001"],
            vec!["1002", "dino_anky", "2002", "3002"],
        ],
        vec![
            vec!["u1", "dino_raptor", "Complexity", "3", "2026-03-01T10:00:00+00:00"],
            vec!["u1", "dino_anky", "Complexity", "4", "2026-03-01T10:01:00+00:00"],
        ],
    );
    let platform = Arc::new(FakePlatform::new());
    platform.broken_edits.lock().unwrap().insert(3001);
    let (scheduler, _repo) = scheduler_for(store, platform.clone()).await;

    scheduler.run_cycle().await.unwrap();

    // dino_raptor's edit failed; dino_anky still updated
    let edits = platform.edits.lock().unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].1, 3002);
}

#[tokio::test]
async fn deleted_results_surface_is_reposted_mid_cycle() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", "3001"]],
        vec![vec!["u1", "dino_raptor", "Complexity", "5", "2026-03-01T10:00:00+00:00"]],
    );
    let platform = Arc::new(FakePlatform::new());
    platform.missing_messages.lock().unwrap().insert(3001);
    let (scheduler, _repo) = scheduler_for(store.clone(), platform.clone()).await;

    scheduler.run_cycle().await.unwrap();

    assert!(platform.edits.lock().unwrap().is_empty());
    assert_eq!(platform.posts.lock().unwrap().len(), 1);
    let rows = store.rows(METADATA_TAB);
    assert_ne!(rows[1][3], "3001");
}

#[tokio::test]
async fn unreadable_vote_log_fails_the_cycle_without_publishing() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", "3001"]],
        vec![vec!["u1", "dino_raptor", "Complexity", "3", "2026-03-01T10:00:00+00:00"]],
    );
    store.fail_next_reads(VOTES_TAB, 1);
    let platform = Arc::new(FakePlatform::new());
    let (scheduler, _repo) = scheduler_for(store, platform.clone()).await;

    assert!(scheduler.run_cycle().await.is_err());
    assert!(platform.edits.lock().unwrap().is_empty());
    assert!(platform.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_vote_log_falls_back_to_compiled_tab() {
    let store = store_with(vec![], vec![]);
    store.seed_tab(
        COMPILED_TAB,
        &COMPILED_HEADER,
        vec![vec!["dino_raptor", "Complexity", "4.0"]],
    );

    let scores = compile_current(store.as_ref()).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].entity_id, "dino_raptor");
    assert!((scores[0].score - 4.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn tick_during_running_cycle_is_skipped_not_queued() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(FakeStore::gated(Arc::clone(&gate)));
    store.seed_tab(METADATA_TAB, &METADATA_HEADER, vec![]);
    store.seed_tab(VOTES_TAB, &VOTES_HEADER, vec![]);
    store.seed_tab(COMPILED_TAB, &COMPILED_HEADER, vec![]);

    let platform = Arc::new(FakePlatform::new());
    let repo = Arc::new(MetadataRepository::new(store.clone()));
    let scheduler = Arc::new(ResultsScheduler::new(
        store.clone(),
        platform,
        repo,
        Duration::from_secs(60),
    ));
    let handle = scheduler.spawn();

    // First tick starts a cycle that blocks on the gated store read
    tokio::time::sleep(Duration::from_secs(61)).await;
    // Second tick lands while that cycle is still blocked and must be dropped
    tokio::time::sleep(Duration::from_secs(60)).await;

    gate.add_permits(16);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Exactly one cycle's reads happened (votes then compiled), not two
    assert_eq!(store.read_count.load(Ordering::SeqCst), 2);

    scheduler.stop();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_cycle_in_flight() {
    let store = store_with(
        vec![vec!["1001", "dino_raptor", "2001", "3001"]],
        vec![vec!["u1", "dino_raptor", "Complexity", "4", "2026-03-01T10:00:00+00:00"]],
    );
    let platform = Arc::new(FakePlatform::new());
    let gate = Arc::new(Semaphore::new(0));
    platform.gate_edits(Arc::clone(&gate));
    let (scheduler, _repo) = scheduler_for(store, platform.clone()).await;

    let mut handle = scheduler.spawn();

    // First tick starts a cycle that blocks inside the publish edit
    tokio::time::sleep(scheduler_interval_plus_one()).await;
    scheduler.stop();

    // The loop must not exit while that entity's write is still in flight
    let still_running = tokio::time::timeout(Duration::from_secs(5), &mut handle).await;
    assert!(still_running.is_err());
    assert!(platform.edits.lock().unwrap().is_empty());

    gate.add_permits(1);
    handle.await.unwrap();

    // The write completed before shutdown rather than being torn down
    assert_eq!(platform.edits.lock().unwrap().len(), 1);
}

fn scheduler_interval_plus_one() -> Duration {
    Duration::from_secs(45 * 60 + 1)
}
