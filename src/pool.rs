//! Fixed-size worker pool (spec §5 REDESIGN DECISION in `SPEC_FULL.md`):
//! one `JoinHandle` per worker pulling jobs off a shared `mpsc` queue. This
//! is the textbook Rust thread pool shape, structurally identical to what
//! `tii` and `afire` (`other_examples/`) use for the same purpose in place
//! of the teacher's `tokio` task scheduler.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
  NewJob(Job),
  Shutdown,
}

struct Worker {
  #[allow(dead_code)]
  id: usize,
  handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
  fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Message>>>) -> Self {
    let handle = thread::Builder::new()
      .name(format!("embercore-worker-{id}"))
      .spawn(move || loop {
        let message = receiver.lock().unwrap().recv();
        match message {
          Ok(Message::NewJob(job)) => job(),
          Ok(Message::Shutdown) | Err(_) => break,
        }
      })
      .expect("failed to spawn worker thread");

    Worker {
      id,
      handle: Some(handle),
    }
  }
}

/// A bounded pool of worker threads (spec §5: "bounded pool of 25 by
/// default, configurable"). Each accepted HTTP connection/request is
/// dispatched as one job.
pub struct ThreadPool {
  workers: Vec<Worker>,
  sender: Option<mpsc::Sender<Message>>,
}

impl ThreadPool {
  /// # Panics
  /// Panics if `size` is zero -- a pool with no workers can never make
  /// progress, so this is a programming error rather than a runtime one.
  pub fn new(size: usize) -> Self {
    assert!(size > 0, "thread pool size must be greater than zero");

    let (sender, receiver) = mpsc::channel();
    let receiver = Arc::new(Mutex::new(receiver));

    let workers = (0..size).map(|id| Worker::new(id, receiver.clone())).collect();

    ThreadPool {
      workers,
      sender: Some(sender),
    }
  }

  pub fn execute<F>(&self, job: F)
  where
    F: FnOnce() + Send + 'static,
  {
    if let Some(sender) = &self.sender {
      let _ = sender.send(Message::NewJob(Box::new(job)));
    }
  }

  pub fn size(&self) -> usize {
    self.workers.len()
  }
}

impl Drop for ThreadPool {
  fn drop(&mut self) {
    if let Some(sender) = &self.sender {
      for _ in &self.workers {
        let _ = sender.send(Message::Shutdown);
      }
    }
    self.sender = None;

    for worker in &mut self.workers {
      if let Some(handle) = worker.handle.take() {
        let _ = handle.join();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Barrier;

  #[test]
  fn all_submitted_jobs_run() {
    let pool = ThreadPool::new(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(11));

    for _ in 0..10 {
      let counter = counter.clone();
      let barrier = barrier.clone();
      pool.execute(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        barrier.wait();
      });
    }
    barrier.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 10);
  }

  #[test]
  #[should_panic(expected = "greater than zero")]
  fn zero_sized_pool_panics() {
    ThreadPool::new(0);
  }
}
