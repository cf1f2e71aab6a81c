//! Keeps long-running timer loops alive.
//!
//! A supervised loop is spawned on its own task. If that task panics or returns,
//! the supervisor waits [`RESTART_DELAY`] and spawns a fresh one. Shutdown aborts the
//! current task and ends supervision.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Spawn `make_loop()` under supervision until `shutdown` flips to `true`.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    mut shutdown: watch::Receiver<bool>,
    make_loop: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut restarts: u64 = 0;

        loop {
            let mut task = tokio::spawn(make_loop());

            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    task.abort();
                    break;
                }
                result = &mut task => match result {
                    Ok(()) => tracing::warn!(task = name, "Supervised loop returned"),
                    Err(e) if e.is_panic() => tracing::error!(task = name, "Supervised loop panicked"),
                    Err(e) => tracing::error!(task = name, error = %e, "Supervised loop failed"),
                },
            }

            restarts += 1;
            tracing::info!(task = name, restarts, "Restarting in {}s", RESTART_DELAY.as_secs());

            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(RESTART_DELAY) => {}
            }
        }

        tracing::info!(task = name, "Supervision stopped");
    })
}
