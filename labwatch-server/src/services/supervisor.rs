use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sleeps for `duration` unless the stop signal changes first
pub async fn pause(stop: &mut watch::Receiver<bool>, duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = stop.changed() => {}
    }
}

/// Runs `work` on its own task and starts it again after a panic.
///
/// Supervision ends when `work` returns normally or the stop signal is set.
pub fn supervise<F, Fut>(
    name: &'static str,
    mut stop: watch::Receiver<bool>,
    backoff: Duration,
    work: F,
) -> JoinHandle<()>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u32 = 0;

        loop {
            match tokio::spawn(work(stop.clone())).await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    restarts += 1;
                    tracing::error!("{} loop panicked ({} restarts): {}", name, restarts, e);
                }
                Err(e) => {
                    tracing::error!("{} loop cancelled: {}", name, e);
                    break;
                }
            }

            if *stop.borrow() {
                break;
            }
            pause(&mut stop, backoff).await;
            if *stop.borrow() {
                break;
            }

            tracing::info!("Restarting {} loop", name);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_supervise_restarts_after_panic() {
        let (_stop_tx, stop_rx) = watch::channel(false);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let handle = supervise("test", stop_rx, Duration::from_millis(1), move |_stop| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("boom");
                }
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_supervise_stops_restarting_once_stopped() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        stop_tx.send_replace(true);
        let handle = supervise("test", stop_rx, Duration::from_millis(1), move |_stop| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }
        });

        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
