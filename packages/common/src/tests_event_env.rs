use crate::event_env::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_unlock_render_queues_signal() {
    let (env, mut signals) = event_env(DEFAULT_SIGNAL_CAPACITY);

    env.lock().unlock_render();

    assert_eq!(signals.try_wait(), Some(true));
    assert_eq!(signals.try_wait(), None);
}

#[test]
fn test_unlock_only_queues_nothing() {
    let (env, mut signals) = event_env(DEFAULT_SIGNAL_CAPACITY);

    env.lock().unlock_only();

    assert_eq!(signals.try_wait(), None);
}

#[test]
fn test_full_channel_drops_extra_requests() {
    let (env, mut signals) = event_env(2);

    for _ in 0..5 {
        env.lock().unlock_render();
    }

    assert_eq!(signals.try_wait(), Some(true));
    assert_eq!(signals.try_wait(), Some(true));
    assert_eq!(signals.try_wait(), None);
}

#[test]
fn test_exit_survives_full_channel() {
    let (env, mut signals) = event_env(1);

    env.request_render();
    env.request_exit();

    assert!(env.is_exit_requested());
    assert_eq!(signals.try_wait(), Some(false));
}

#[test]
fn test_drain_counts_pending_signals() {
    let (env, mut signals) = event_env(8);

    env.request_render();
    env.request_render();
    env.request_render();

    assert_eq!(signals.drain(), 3);
    assert_eq!(signals.try_wait(), None);
}

#[test]
fn test_zero_capacity_is_clamped() {
    let (env, mut signals) = event_env(0);

    env.request_render();

    assert_eq!(signals.try_wait(), Some(true));
}

#[test]
fn test_reader_never_sees_partial_mutation() {
    let (env, _signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    let first = Arc::new(AtomicBool::new(false));
    let second = Arc::new(AtomicBool::new(false));

    let guard = env.lock();
    let worker = {
        let env = env.clone();
        let first = first.clone();
        let second = second.clone();
        std::thread::spawn(move || {
            let _read = env.read();
            (first.load(Ordering::SeqCst), second.load(Ordering::SeqCst))
        })
    };

    first.store(true, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(20));
    second.store(true, Ordering::SeqCst);
    guard.unlock_only();

    let seen = worker.join().expect("reader thread panicked");
    assert_eq!(seen, (true, true));
}

#[tokio::test]
async fn test_wait_returns_true_on_signal() {
    let (env, mut signals) = event_env(DEFAULT_SIGNAL_CAPACITY);

    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        env.lock().unlock_render();
    });

    assert!(signals.wait(&|| true).await);
    task.await.expect("signal task failed");
}

#[tokio::test]
async fn test_wait_returns_false_when_host_gone() {
    let (env, mut signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    env.request_render();

    assert!(!signals.wait(&|| false).await);
}

#[tokio::test]
async fn test_wait_returns_false_after_exit() {
    let (env, mut signals) = event_env(DEFAULT_SIGNAL_CAPACITY);
    env.request_exit();

    assert!(!signals.wait(&|| true).await);
}
