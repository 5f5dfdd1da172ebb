//! Post-Flush Scheduling
//!
//! Watchers created with `flush: post` do not run inside the triggering
//! write. Their jobs go into the context's FIFO queue, and the context asks
//! its [`PostFlush`] strategy to arrange one drain per batch:
//!
//! - [`ManualFlush`]: the host calls [`Reactivity::flush_post`] itself, e.g.
//!   once per frame or once per event-loop turn.
//! - [`TokioFlush`]: a task is spawned on a tokio runtime; it yields once so
//!   the current synchronous turn completes, then drains the queue.
//!
//! Jobs are never deduplicated: two writes that hit the same watcher queue
//! two jobs.

use tokio::runtime::Handle;

use super::Reactivity;

/// Strategy for draining deferred jobs.
pub trait PostFlush: Send + Sync {
    /// Called when the first job of a batch is queued.
    fn request_flush(&self, ctx: Reactivity);
}

/// The host drains the queue explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualFlush;

impl PostFlush for ManualFlush {
    fn request_flush(&self, _ctx: Reactivity) {}
}

/// Drain the queue from a task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioFlush {
    handle: Handle,
}

impl TokioFlush {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl PostFlush for TokioFlush {
    fn request_flush(&self, ctx: Reactivity) {
        self.handle.spawn(async move {
            tokio::task::yield_now().await;
            ctx.flush_post();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn manual_flush_waits_for_the_host() {
        let ctx = Reactivity::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        ctx.queue_post_job(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        ctx.flush_post();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tokio_flush_drains_after_yield() {
        let strategy = TokioFlush::current().expect("inside a tokio runtime");
        let ctx = Reactivity::builder().post_flush(strategy).build();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = Arc::clone(&ran);
            ctx.queue_post_job(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.pending_post_jobs(), 0);
    }
}
