use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::PipelineError;

/// Single-flight guard shared by everything that touches frame resources.
///
/// One permit; waiting callers are admitted in arrival order. The permit and
/// the running flag are released when the run's future completes, errors,
/// panics or is dropped.
#[derive(Debug)]
pub struct ExclusivityGate {
    permit: Semaphore,
    in_progress: AtomicBool,
    admitted: AtomicU64,
}

impl Default for ExclusivityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExclusivityGate {
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
            in_progress: AtomicBool::new(false),
            admitted: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Number of runs admitted so far.
    pub fn admitted_runs(&self) -> u64 {
        self.admitted.load(Ordering::Acquire)
    }

    pub async fn run_exclusively<F, Fut, T>(&self, run: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire().await?;
        Ok(run().await)
    }

    async fn acquire(&self) -> Result<RunGuard<'_>, PipelineError> {
        let permit = self
            .permit
            .acquire()
            .await
            .map_err(|_| PipelineError::ResourceUnavailable {
                reason: "exclusivity gate closed".to_string(),
            })?;
        self.in_progress.store(true, Ordering::Release);
        let ticket = self.admitted.fetch_add(1, Ordering::AcqRel) + 1;
        log::trace!("gate admitted run={ticket}");
        Ok(RunGuard {
            gate: self,
            _permit: permit,
        })
    }
}

struct RunGuard<'a> {
    gate: &'a ExclusivityGate,
    _permit: SemaphorePermit<'a>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.gate.in_progress.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::future::{AbortHandle, Abortable};
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn second_run_waits_for_the_first() {
        let gate = Arc::new(ExclusivityGate::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = tokio::spawn({
            let gate = Arc::clone(&gate);
            let events = Arc::clone(&events);
            async move {
                gate.run_exclusively(move || async move {
                    events.lock().unwrap().push("first-start");
                    let _ = release_rx.await;
                    events.lock().unwrap().push("first-end");
                })
                .await
            }
        });
        while !gate.is_running() {
            tokio::task::yield_now().await;
        }

        let second = tokio::spawn({
            let gate = Arc::clone(&gate);
            let events = Arc::clone(&events);
            async move {
                gate.run_exclusively(move || async move {
                    events.lock().unwrap().push("second");
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*events.lock().unwrap(), vec!["first-start"]);
        assert_eq!(gate.admitted_runs(), 1);

        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["first-start", "first-end", "second"]
        );
        assert_eq!(gate.admitted_runs(), 2);
        assert!(!gate.is_running());
    }

    #[tokio::test]
    async fn aborted_run_releases_the_gate() {
        let gate = Arc::new(ExclusivityGate::new());
        let (handle, registration) = AbortHandle::new_pair();
        let task = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                Abortable::new(
                    gate.run_exclusively(futures_util::future::pending::<()>),
                    registration,
                )
                .await
            }
        });
        while !gate.is_running() {
            tokio::task::yield_now().await;
        }

        handle.abort();
        assert!(task.await.unwrap().is_err());
        assert!(!gate.is_running());

        let value = gate.run_exclusively(|| async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn panicking_run_releases_the_gate() {
        let gate = Arc::new(ExclusivityGate::new());
        let task = tokio::spawn({
            let gate = Arc::clone(&gate);
            async move {
                gate.run_exclusively(|| async {
                    panic!("stage blew up");
                })
                .await
            }
        });
        assert!(task.await.unwrap_err().is_panic());
        assert!(!gate.is_running());
        assert!(gate.run_exclusively(|| async {}).await.is_ok());
    }

    #[tokio::test]
    async fn flag_is_set_only_while_running() {
        let gate = ExclusivityGate::new();
        assert!(!gate.is_running());
        let observed = gate.run_exclusively(|| async { gate.is_running() }).await;
        assert!(observed.unwrap());
        assert!(!gate.is_running());
    }
}
