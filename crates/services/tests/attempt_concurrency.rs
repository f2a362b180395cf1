use std::path::PathBuf;
use std::sync::Arc;

use progress_core::model::{AttemptId, LearnerId, LessonId};
use progress_core::time::fixed_now;
use services::{AttemptLifecycleService, Clock};
use storage::repository::{AttemptRepository, InMemoryRepository};
use storage::sqlite::SqliteRepository;

const CONTENDERS: usize = 16;

async fn race(svc: Arc<AttemptLifecycleService>) -> Vec<(AttemptId, bool)> {
    let mut handles = Vec::with_capacity(CONTENDERS);
    for _ in 0..CONTENDERS {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            svc.create_or_get_active("lesson-1", "ada", "course-1")
                .await
                .expect("create_or_get_active")
        }));
    }

    let mut results = Vec::with_capacity(CONTENDERS);
    for handle in handles {
        let active = handle.await.expect("task panicked");
        results.push((active.attempt_id, active.is_new));
    }
    results
}

fn assert_single_winner(results: &[(AttemptId, bool)]) {
    let first = results[0].0;
    assert!(results.iter().all(|(id, _)| *id == first));
    assert_eq!(results.iter().filter(|(_, is_new)| *is_new).count(), 1);
}

async fn active_count(repo: &dyn AttemptRepository) -> usize {
    repo.find_active_attempts(
        &LearnerId::parse("ada").unwrap(),
        &LessonId::parse("lesson-1").unwrap(),
    )
    .await
    .unwrap()
    .len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_in_memory_yields_one_attempt() {
    let repo = InMemoryRepository::new();
    let svc = Arc::new(AttemptLifecycleService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
    ));

    let results = race(svc).await;
    assert_single_winner(&results);
    assert_eq!(active_count(&repo).await, 1);
}

struct TempDb(PathBuf);

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_in_sqlite_yields_one_attempt() {
    let db = TempDb(std::env::temp_dir().join(format!(
        "progress-race-{}.sqlite",
        AttemptId::generate()
    )));
    let url = format!("sqlite://{}?mode=rwc", db.0.display());
    let repo = SqliteRepository::open(&url).await.expect("open");

    let svc = Arc::new(AttemptLifecycleService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
    ));

    let results = race(svc).await;
    assert_single_winner(&results);
    assert_eq!(active_count(&repo).await, 1);
}
