//! The concurrent union iterator (§4.7 NUnion / StatementSourcePattern): merges several
//! independently-producing [`BindingStream`]s into one, yielding rows in whatever order they
//! arrive rather than child-by-child.

use crate::error::EvaluationError;
use crate::model::Bindings;
use crate::scheduler::{ExecutorControl, WorkerPool};
use crate::source::BindingStream;
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;

/// Drains every child stream on `pool`'s worker threads, forwarding each row onto one shared
/// bounded channel as it arrives. A full channel applies backpressure to the fastest producer
/// rather than buffering unboundedly (§5 connection policy, mirrored here for in-process fan-in).
pub struct ConcurrentUnion {
    receiver: Receiver<Result<Bindings, EvaluationError>>,
}

impl ConcurrentUnion {
    pub fn new(pool: &WorkerPool, children: Vec<BindingStream>, capacity: usize, control: Arc<ExecutorControl>) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        for child in children {
            let sender = sender.clone();
            let control = Arc::clone(&control);
            pool.schedule_fn(move || {
                for item in child {
                    if control.is_aborted() {
                        break;
                    }
                    match item {
                        Ok(row) => {
                            if sender.send(Ok(row)).is_err() {
                                // Receiver dropped: the consumer closed this subtree early (§4.7
                                // Cancellation) — stop draining instead of blocking forever.
                                break;
                            }
                        }
                        Err(error) => {
                            // §7: one source's failure cancels the whole query instead of being
                            // silently outrun by whatever the other sources returned.
                            let endpoint = error.endpoint();
                            control.toss(error, endpoint);
                            break;
                        }
                    }
                }
            });
        }
        // Drop the template sender so the channel closes once every spawned clone above does.
        drop(sender);
        Self { receiver }
    }
}

impl Iterator for ConcurrentUnion {
    type Item = Result<Bindings, EvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
