//! A concurrency-limited FIFO queue of asynchronous tasks.
//!
//! Tasks are dispatched in insertion order as soon as a slot is free, and may add further
//! tasks while they run. `done()` settles once completion was requested and every task
//! has settled, or as soon as any task fails. A failure also closes the queue: tasks still
//! waiting for a slot are dropped and only those already running get to finish.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError<E> {
    /// `add` was called after the queue finished or failed.
    #[error("Cannot add tasks to a queue that has ended")]
    Closed,

    /// The task itself failed.
    #[error("{0}")]
    Task(E),

    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The task was dropped without settling: an earlier task failed before it started,
    /// or its runtime shut down.
    #[error("Task was dropped before it settled")]
    Dropped,
}

/// Settled state of the queue as a whole. The first failure wins.
#[derive(Debug, Clone)]
enum Completion<E> {
    Pending,
    Fulfilled,
    Rejected(QueueError<E>),
}

type Task<E> = BoxFuture<'static, Result<(), QueueError<E>>>;

struct State<E> {
    tasks: VecDeque<Task<E>>,
    in_flight: usize,
    done_requested: bool,
    closed: bool,
}

struct Shared<E> {
    concurrency: usize,
    state: Mutex<State<E>>,
    completion: watch::Sender<Completion<E>>,
}

/// Cloning yields another handle onto the same queue, so running tasks can enqueue more work.
pub struct TaskQueue<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for TaskQueue<E> {
    fn clone(&self) -> Self {
        TaskQueue {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> fmt::Debug for TaskQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TaskQueue")
            .field("concurrency", &self.shared.concurrency)
            .field("queued", &state.tasks.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<E> TaskQueue<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// A queue running at most `concurrency` tasks at once (at least one).
    pub fn new(concurrency: usize) -> Self {
        let (completion, _) = watch::channel(Completion::Pending);
        TaskQueue {
            shared: Arc::new(Shared {
                concurrency: concurrency.max(1),
                state: Mutex::new(State {
                    tasks: VecDeque::new(),
                    in_flight: 0,
                    done_requested: false,
                    closed: false,
                }),
                completion,
            }),
        }
    }

    /// Enqueues `task` and dispatches it right away if a slot is free.
    ///
    /// The returned handle resolves with the task's own result; awaiting it is optional.
    /// Must be called within a tokio runtime.
    pub fn add<T, F>(&self, task: F) -> Result<Pending<T, E>, QueueError<E>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task: Task<E> = Box::pin(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(value)) => {
                    let _ = sender.send(Ok(value));
                    return Ok(());
                }
                Ok(Err(err)) => QueueError::Task(err),
                Err(panic) => QueueError::Panicked(panic_message(panic)),
            };
            let _ = sender.send(Err(outcome.clone()));
            Err(outcome)
        });

        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.tasks.push_back(task);
        }
        Shared::dispatch(&self.shared);

        Ok(Pending { receiver })
    }

    /// Marks the queue complete and waits for every task to settle.
    ///
    /// Resolves immediately when nothing is queued or running. Fails with the first task
    /// failure, without waiting for tasks still in flight. Once this has been called and
    /// the queue drained, or once a task failed, further `add` calls fail with
    /// [`QueueError::Closed`].
    pub async fn done(&self) -> Result<(), QueueError<E>> {
        let mut receiver = self.shared.completion.subscribe();

        let drained = {
            let mut state = self.shared.lock();
            state.done_requested = true;
            let drained = state.in_flight == 0 && state.tasks.is_empty();
            if drained {
                state.closed = true;
            }
            drained
        };
        if drained {
            self.shared.settle(Completion::Fulfilled);
        }

        let completion = receiver
            .wait_for(|completion| !matches!(completion, Completion::Pending))
            .await
            .map_err(|_| QueueError::Dropped)?
            .clone();

        match completion {
            Completion::Rejected(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }
}

impl<E> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Shared<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Records the queue-wide outcome unless one was already recorded.
    fn settle(&self, outcome: Completion<E>) {
        self.completion.send_if_modified(|completion| {
            if matches!(completion, Completion::Pending) {
                *completion = outcome;
                true
            } else {
                false
            }
        });
    }

    /// Settles the queue with `err`, closes it and drops every task not yet started.
    fn reject(&self, err: QueueError<E>) {
        self.settle(Completion::Rejected(err));
        let abandoned = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.tasks)
        };
        if !abandoned.is_empty() {
            tracing::debug!("Dropping {} queued tasks after a failure", abandoned.len());
        }
    }

    /// Starts queued tasks until the concurrency limit is reached. Closes the queue when
    /// it has drained after completion was requested.
    fn dispatch(shared: &Arc<Self>) {
        loop {
            let task = {
                let mut state = shared.lock();
                if state.in_flight >= shared.concurrency {
                    return;
                }
                let Some(task) = state.tasks.pop_front() else {
                    let finished = state.in_flight == 0 && state.done_requested && !state.closed;
                    if finished {
                        state.closed = true;
                        drop(state);
                        shared.settle(Completion::Fulfilled);
                    }
                    return;
                };
                state.in_flight += 1;
                tracing::trace!("Dispatching task ({} in flight)", state.in_flight);
                task
            };

            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                if let Err(err) = task.await {
                    shared.reject(err);
                }
                shared.lock().in_flight -= 1;
                Shared::dispatch(&shared);
            });
        }
    }
}

/// Resolves with the result of one task added to a [`TaskQueue`].
#[must_use = "a pending task does nothing unless awaited; drop it to ignore the result"]
pub struct Pending<T, E> {
    receiver: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> Future for Pending<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Dropped)))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue: TaskQueue<String> = TaskQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let max_running = max_running.clone();
            let _ = queue
                .add(async move {
                    let current = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(current, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        queue.done().await.unwrap();
        assert_eq!(max_running.load(Ordering::SeqCst), 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_done_with_no_tasks_resolves() {
        let queue: TaskQueue<String> = TaskQueue::new(4);
        let result = timeout(Duration::from_secs(1), queue.done()).await;
        assert_eq!(result, Ok(Ok(())));
    }

    #[tokio::test]
    async fn test_add_after_done_is_closed() {
        let queue: TaskQueue<String> = TaskQueue::new(1);
        queue.done().await.unwrap();
        let err = queue.add(async { Ok(()) }).err();
        assert_eq!(err, Some(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_queue_stays_open_until_done_is_requested() {
        let queue: TaskQueue<String> = TaskQueue::new(1);
        assert_eq!(queue.add(async { Ok(1) }).unwrap().await, Ok(1));
        // drained, but completion was never requested
        assert_eq!(queue.add(async { Ok(2) }).unwrap().await, Ok(2));
        queue.done().await.unwrap();
    }

    #[tokio::test]
    async fn test_task_results_are_returned() {
        let queue: TaskQueue<String> = TaskQueue::new(2);
        let ok = queue.add(async { Ok::<_, String>("value") }).unwrap();
        let failed = queue.add(async { Err::<(), _>("boom".to_string()) }).unwrap();
        assert_eq!(ok.await, Ok("value"));
        assert_eq!(failed.await, Err(QueueError::Task("boom".to_string())));
    }

    #[tokio::test]
    async fn test_first_failure_rejects_done_without_cancelling() {
        let queue: TaskQueue<String> = TaskQueue::new(3);
        let finished = Arc::new(AtomicUsize::new(0));

        let _ = queue
            .add(async {
                sleep(Duration::from_millis(10)).await;
                Err::<(), _>("first".to_string())
            })
            .unwrap();
        let second = queue
            .add(async {
                sleep(Duration::from_millis(30)).await;
                Err::<(), _>("second".to_string())
            })
            .unwrap();
        let slow = {
            let finished = finished.clone();
            queue
                .add(async move {
                    sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
        };

        assert_eq!(queue.done().await, Err(QueueError::Task("first".to_string())));
        assert_eq!(second.await, Err(QueueError::Task("second".to_string())));
        assert_eq!(slow.await, Ok(()));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_drops_queued_tasks_and_closes() {
        let queue: TaskQueue<String> = TaskQueue::new(1);
        let started = Arc::new(AtomicUsize::new(0));

        let failing = queue
            .add(async {
                sleep(Duration::from_millis(10)).await;
                Err::<(), _>("boom".to_string())
            })
            .unwrap();
        let queued = {
            let started = started.clone();
            queue
                .add(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
        };

        assert_eq!(failing.await, Err(QueueError::Task("boom".to_string())));
        assert_eq!(queued.await, Err(QueueError::Dropped));
        assert_eq!(queue.done().await, Err(QueueError::Task("boom".to_string())));
        assert_eq!(queue.add(async { Ok(()) }).err(), Some(QueueError::Closed));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_running_task_cannot_add_after_failure() {
        let queue: TaskQueue<String> = TaskQueue::new(2);
        let added_late = Arc::new(AtomicUsize::new(0));

        let _ = queue
            .add(async { Err::<(), _>("boom".to_string()) })
            .unwrap();
        let still_running = {
            let queue = queue.clone();
            let added_late = added_late.clone();
            queue
                .clone()
                .add(async move {
                    sleep(Duration::from_millis(30)).await;
                    let added = queue.add(async move {
                        added_late.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                    Ok(added.err())
                })
                .unwrap()
        };

        assert_eq!(queue.done().await, Err(QueueError::Task("boom".to_string())));
        assert_eq!(still_running.await, Ok(Some(QueueError::Closed)));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(added_late.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_is_fifo() {
        let queue: TaskQueue<String> = TaskQueue::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            let _ = queue
                .add(async move {
                    sleep(Duration::from_millis(1)).await;
                    order.lock().unwrap().push(i);
                    Ok(())
                })
                .unwrap();
        }

        queue.done().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_tasks_can_add_tasks() {
        let queue: TaskQueue<String> = TaskQueue::new(2);
        let count = Arc::new(AtomicUsize::new(0));

        let nested_queue = queue.clone();
        let nested_count = count.clone();
        let _ = queue
            .add(async move {
                sleep(Duration::from_millis(5)).await;
                let inner_count = nested_count.clone();
                let _ = nested_queue
                    .add(async move {
                        sleep(Duration::from_millis(5)).await;
                        inner_count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .map_err(|err| err.to_string())?;
                nested_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        queue.done().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_rejects() {
        let queue: TaskQueue<String> = TaskQueue::new(1);
        let pending = queue
            .add(async {
                if true {
                    panic!("render exploded");
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(pending.await, Err(QueueError::Panicked("render exploded".to_string())));
        assert_eq!(queue.done().await, Err(QueueError::Panicked("render exploded".to_string())));
    }
}
