// Pool executor demo: a fixed number of workers share a small pool of
// expensive handlers.
//
// Run with: RUST_LOG=debug cargo run

use gpool::{Pool, PoolResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const TOTAL_TASKS: usize = 20;
const CONCURRENCY: usize = 10;
const POOL_SIZE: usize = 5;
const HANDLE_TIME: Duration = Duration::from_millis(300);

/// Stand-in for a handler that is costly to build.
struct LazyHandler {
    id: usize,
    jobs: AtomicUsize,
}

impl LazyHandler {
    fn new(id: usize) -> Self {
        info!(handler = id, "building handler");
        Self {
            id,
            jobs: AtomicUsize::new(0),
        }
    }

    fn handle(&self) -> usize {
        info!(handler = self.id, "doing the job, no hurry");
        thread::sleep(HANDLE_TIME);
        self.jobs.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn close(&self) {
        warn!(
            handler = self.id,
            jobs = self.jobs.load(Ordering::Relaxed),
            "closing handler"
        );
    }
}

struct HandlerManager {
    pool: Pool<LazyHandler>,
}

impl HandlerManager {
    fn new(size: usize) -> PoolResult<Self> {
        let mut next_id = 0;
        let pool = Pool::new(size, || {
            next_id += 1;
            LazyHandler::new(next_id)
        })?;
        Ok(Self { pool })
    }

    fn handle(&self) -> PoolResult<usize> {
        let handler = self.pool.get()?;
        Ok(handler.handle())
    }

    /// Drain every handler, close it, then close the pool.
    ///
    /// Only valid once all workers are done.
    fn close(&self) -> PoolResult<()> {
        for _ in 0..self.pool.capacity() {
            let handler = self.pool.acquire()?;
            handler.close();
        }
        for handler in self.pool.close()? {
            handler.close();
        }
        Ok(())
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let manager = match HandlerManager::new(POOL_SIZE) {
        Ok(manager) => manager,
        Err(err) => {
            error!(error = %err, "failed to build handler pool");
            std::process::exit(1);
        }
    };

    let (tasks_tx, tasks_rx) = crossbeam::channel::unbounded::<usize>();

    thread::scope(|s| {
        for worker in 0..CONCURRENCY {
            let tasks = tasks_rx.clone();
            let manager = &manager;
            s.spawn(move || {
                for task in tasks {
                    match manager.handle() {
                        Ok(job) => info!(worker, task, job, "got result"),
                        Err(err) => error!(worker, task, error = %err, "task failed"),
                    }
                }
            });
        }

        for task in 0..TOTAL_TASKS {
            if tasks_tx.send(task).is_err() {
                break;
            }
        }
        drop(tasks_tx);
    });

    info!(metrics = ?manager.pool.metrics(), "all tasks finished");

    if let Err(err) = manager.close() {
        error!(error = %err, "failed to close handler pool");
    }
}
