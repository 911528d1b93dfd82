//! Bridges an async load into the cooperative task model.

use std::future::Future;

use runtime::{Step, StepContext, Task};
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::source::LoadError;

/// Polls a spawned future from [`Task::step`].
///
/// The future runs on the tokio runtime; each step only checks whether its
/// result has arrived. Dropping the task aborts the future, so a superseded
/// load never delivers anything.
pub struct LoadTask<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
    handle: JoinHandle<()>,
}

impl<T, E> LoadTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn spawn<F>(runtime: &Handle, fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = runtime.spawn(async move {
            // A closed receiver means the load was superseded.
            let _ = tx.send(fut.await);
        });
        Self { rx, handle }
    }
}

impl<T, E> Drop for LoadTask<T, E> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<T, E> Task for LoadTask<T, E>
where
    E: From<LoadError>,
{
    type Output = T;
    type Error = E;

    fn step(&mut self, cx: &mut StepContext<'_>) -> Step<T, E> {
        if cx.is_canceled() {
            return Step::Canceled;
        }
        match self.rx.try_recv() {
            Ok(Ok(value)) => Step::Ready(value),
            Ok(Err(err)) => Step::Failed(err),
            Err(TryRecvError::Empty) => Step::pending(),
            Err(TryRecvError::Closed) => Step::Failed(E::from(LoadError::Transport {
                message: "load ended without a result".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{CancelToken, ManualClock};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    async fn settle(task: &mut LoadTask<u32, LoadError>) -> Step<u32, LoadError> {
        let clock = ManualClock::new(0.0);
        let cancel = CancelToken::new();
        for _ in 0..200 {
            let step = {
                let mut cx = StepContext::new(&cancel, &clock, 100.0);
                task.step(&mut cx)
            };
            if !step.is_pending() {
                return step;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Step::pending()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn delivers_result_of_spawned_future() {
        let mut task = LoadTask::spawn(&Handle::current(), async { Ok::<_, LoadError>(42) });
        assert!(matches!(settle(&mut task).await, Step::Ready(42)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn delivers_errors_as_failures() {
        let mut task = LoadTask::<u32, LoadError>::spawn(&Handle::current(), async {
            Err(LoadError::from_status(404, "x.json"))
        });
        match settle(&mut task).await {
            Step::Failed(e) => assert_eq!(e.status(), Some(404)),
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn dropping_the_task_aborts_the_load() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = LoadTask::<u32, LoadError>::spawn(&Handle::current(), async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        });
        drop(task);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
