use chatlist::MessageRef;
use chatlist::diff::{DiffRequest, DiffResponse, diff_items};
use chatlist::diff_engine::{BlockingDiffWorker, DiffEngine, DiffWorker, WorkerError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn messages(range: std::ops::Range<usize>) -> Vec<MessageRef> {
    range.map(|i| MessageRef::new(format!("msg-{i}"), "peer")).collect()
}

/// Refuses every request.
struct RefusingWorker;

impl DiffWorker for RefusingWorker {
    fn dispatch(&self, _: DiffRequest) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        Err(WorkerError::Spawn("worker pool exhausted".to_string()))
    }
}

/// Accepts requests and drops the reply channel.
struct DroppingWorker;

impl DiffWorker for DroppingWorker {
    fn dispatch(&self, _: DiffRequest) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        let (_tx, rx) = oneshot::channel();
        Ok(rx)
    }
}

/// Panics on the blocking pool before replying.
struct PanickingWorker;

impl DiffWorker for PanickingWorker {
    fn dispatch(&self, _: DiffRequest) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        let (tx, rx) = oneshot::channel::<DiffResponse>();
        tokio::task::spawn_blocking(move || {
            let _tx = tx;
            panic!("diff worker crashed");
        });
        Ok(rx)
    }
}

/// Keeps the reply channel open forever.
#[derive(Default)]
struct StallingWorker {
    held: std::sync::Mutex<Vec<oneshot::Sender<DiffResponse>>>,
}

impl DiffWorker for StallingWorker {
    fn dispatch(&self, _: DiffRequest) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Answers with a response for the wrong generation.
struct ConfusedWorker;

impl DiffWorker for ConfusedWorker {
    fn dispatch(&self, request: DiffRequest) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        let (tx, rx) = oneshot::channel();
        let mut response = request.compute();
        response.generation += 100;
        let _ = tx.send(response);
        Ok(rx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_large_growth_runs_on_worker_and_matches_inline() {
    let _ = env_logger::builder().is_test(true).try_init();

    let engine = DiffEngine::new(500, true);
    let old = messages(0..100);
    let new = messages(0..1000);

    let result = engine.diff(&old, &new).await;

    let expected_added: HashSet<String> = (100..1000).map(|i| format!("msg-{i}")).collect();
    assert_eq!(result.added, expected_added);
    assert!(result.removed.is_empty());
    assert_eq!(result, diff_items(&old, &new));
    assert_eq!(engine.stats().worker_runs, 1);
    assert_eq!(engine.stats().fallback_runs, 0);
}

#[tokio::test]
async fn test_refused_dispatch_falls_back_to_inline_result() {
    let _ = env_logger::builder().is_test(true).try_init();

    let engine = DiffEngine::new(100, true).with_worker(Arc::new(RefusingWorker));
    let old = messages(0..1500);
    let new = messages(500..2000);

    let result = engine.diff(&old, &new).await;

    assert_eq!(result, diff_items(&old, &new));
    assert_eq!(result.added.len(), 500);
    assert_eq!(result.removed.len(), 500);
    assert_eq!(engine.stats().fallback_runs, 1);
}

#[tokio::test]
async fn test_dropped_reply_falls_back() {
    let engine = DiffEngine::new(10, true).with_worker(Arc::new(DroppingWorker));
    let old = messages(0..20);
    let new = messages(5..40);

    assert_eq!(engine.diff(&old, &new).await, diff_items(&old, &new));
    assert_eq!(engine.stats().fallback_runs, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_worker_falls_back() {
    let engine = DiffEngine::new(10, true).with_worker(Arc::new(PanickingWorker));
    let old = messages(0..20);
    let new = messages(0..2000);

    assert_eq!(engine.diff(&old, &new).await, diff_items(&old, &new));
    assert_eq!(engine.stats().fallback_runs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_worker_times_out_and_falls_back() {
    let engine = DiffEngine::new(10, true)
        .with_worker(Arc::new(StallingWorker::default()))
        .with_worker_timeout(Some(Duration::from_millis(2000)));
    let old = messages(0..20);
    let new = messages(10..30);

    assert_eq!(engine.diff(&old, &new).await, diff_items(&old, &new));
    assert_eq!(engine.stats().fallback_runs, 1);
}

#[tokio::test]
async fn test_generation_mismatch_is_rejected() {
    let engine = DiffEngine::new(1, true).with_worker(Arc::new(ConfusedWorker));
    let old = messages(0..3);
    let new = messages(1..6);

    let tracked = engine.diff_tracked(&old, &new).await;
    assert_eq!(tracked.result, diff_items(&old, &new));
    assert!(engine.is_latest(tracked.generation));
    assert_eq!(engine.stats().fallback_runs, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identical_lists_diff_empty_on_both_paths() {
    let items = messages(0..800);
    let inline = DiffEngine::new(10_000, true);
    let worker = DiffEngine::new(10, true).with_worker(Arc::new(BlockingDiffWorker));

    assert!(inline.diff(&items, &items).await.is_empty());
    assert!(worker.diff(&items, &items).await.is_empty());
    assert_eq!(worker.stats().worker_runs, 1);
}
