//! Single-worker FIFO queue that serializes sync tasks.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO queue drained by one dedicated thread.
///
/// Tasks run strictly in submission order and never concurrently. A task
/// that panics is logged and the worker moves on to the next one.
pub struct SerialQueue {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl SerialQueue {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Spawn` if the OS refuses to create the thread.
    pub fn new(name: impl Into<String>) -> SyncResult<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for task in receiver {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        tracing::error!(
                            queue = %worker_name,
                            panic = %panic_message(payload.as_ref()),
                            "sync task panicked"
                        );
                    }
                }
                tracing::debug!(queue = %worker_name, "serial queue drained");
            })
            .map_err(SyncError::Spawn)?;

        Ok(Self {
            name,
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Returns the queue name (also the worker thread name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when called from the worker thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Enqueues a task without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` after [`shutdown`](Self::shutdown).
    pub fn submit<F>(&self, task: F) -> SyncResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(SyncError::EngineStopped)?;
        sender
            .send(Box::new(task))
            .map_err(|_| SyncError::EngineStopped)
    }

    /// Enqueues a task and blocks until it has run, returning its output.
    ///
    /// Called from the worker thread itself, the task runs inline instead,
    /// since waiting on the queue from its own worker would never return.
    ///
    /// # Errors
    ///
    /// - `SyncError::EngineStopped` if the queue is shut down
    /// - `SyncError::TaskFailed` if the task panicked
    pub fn submit_and_wait<F, T>(&self, task: F) -> SyncResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_worker_thread() {
            return run_caught(task);
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = reply_tx.send(run_caught(task));
        })?;

        reply_rx.recv().map_err(|_| SyncError::EngineStopped)?
    }

    /// Blocks until every task submitted so far has run.
    pub fn wait_idle(&self) -> SyncResult<()> {
        self.submit_and_wait(|| ())
    }

    /// Stops accepting tasks, drains the queue and joins the worker.
    ///
    /// Safe to call more than once. When called from the worker itself the
    /// worker is left to exit on its own.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        if self.is_worker_thread() {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!(queue = %self.name, "serial queue worker panicked");
            }
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_caught<F, T>(task: F) -> SyncResult<T>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(task))
        .map_err(|payload| SyncError::TaskFailed(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
