use crate::protocol::ProtocolClient;
use crate::tree::{TreePath, VariableTree};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// What a flush applies dirty paths to. The production sink refreshes
/// arena nodes; tests substitute a recorder.
pub trait RefreshSink: Send + Sync {
    fn refresh(&self, path: &TreePath);
}

/// Batches refresh requests keyed by tree path and flushes them once
/// per interval. Exactly one flush runs at a time; enqueues arriving
/// during a flush land in the next cycle.
#[derive(Clone)]
pub struct RefreshScheduler {
    shared: Arc<SchedulerShared>,
    interval: Duration,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    idle: Condvar,
    sink: Box<dyn RefreshSink>,
}

#[derive(Default)]
struct SchedulerState {
    pending: Vec<TreePath>,
    timer_armed: bool,
    flushing: bool,
}

impl RefreshScheduler {
    pub fn new(sink: Box<dyn RefreshSink>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState::default()),
                idle: Condvar::new(),
                sink,
            }),
            interval,
        }
    }

    pub fn with_default_interval(sink: Box<dyn RefreshSink>) -> Self {
        Self::new(sink, DEFAULT_FLUSH_INTERVAL)
    }

    /// Mark a path dirty. The first enqueue since the last flush arms
    /// the flush timer; repeats of the same path coalesce.
    pub fn enqueue(&self, path: TreePath) {
        let arm = {
            let mut state = match self.shared.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            if !state.pending.contains(&path) {
                state.pending.push(path);
            }
            if state.timer_armed || state.flushing {
                false
            } else {
                state.timer_armed = true;
                true
            }
        };
        if arm {
            self.arm_timer();
        }
    }

    /// Force a flush and wait for it: any in-flight flush finishes
    /// first, then the current pending set is applied on this thread.
    /// Claiming happens under the same lock as the wait, so a timer
    /// flush firing concurrently cannot slip in between and leave this
    /// call returning with its batch still unapplied.
    pub fn flush_now(&self) {
        let batch = {
            let mut state = match self.shared.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            loop {
                if state.flushing {
                    state = match self.shared.idle.wait(state) {
                        Ok(state) => state,
                        Err(_) => return,
                    };
                    continue;
                }
                if state.pending.is_empty() {
                    return;
                }
                state.flushing = true;
                break std::mem::take(&mut state.pending);
            }
        };
        self.apply_batch(batch);
    }

    fn arm_timer(&self) {
        let scheduler = self.clone();
        thread::spawn(move || {
            thread::sleep(scheduler.interval);
            scheduler.run_flush();
        });
    }

    fn run_flush(&self) {
        let batch = {
            let mut state = match self.shared.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            state.timer_armed = false;
            if state.flushing {
                // The in-flight flush re-arms on completion if needed.
                return;
            }
            state.flushing = true;
            std::mem::take(&mut state.pending)
        };
        self.apply_batch(batch);
    }

    fn apply_batch(&self, batch: Vec<TreePath>) {
        let roots = prune_to_roots(batch);
        if !roots.is_empty() {
            tracing::debug!(count = roots.len(), "flushing refresh batch");
        }
        // Sequential, not concurrent: tree mutations keep a stable order.
        for path in &roots {
            self.shared.sink.refresh(path);
        }

        let rearm = {
            let mut state = match self.shared.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            state.flushing = false;
            self.shared.idle.notify_all();
            if !state.pending.is_empty() && !state.timer_armed {
                state.timer_armed = true;
                true
            } else {
                false
            }
        };
        if rearm {
            self.arm_timer();
        }
    }
}

/// Sort dirty paths by ascending depth and drop every path that has
/// an already-selected prefix: refreshing an ancestor re-resolves the
/// descendants anyway.
pub fn prune_to_roots(mut paths: Vec<TreePath>) -> Vec<TreePath> {
    paths.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.cmp(b)));
    let mut roots: Vec<TreePath> = Vec::new();
    for path in paths {
        if roots.iter().any(|root| root.is_prefix_of(&path)) {
            continue;
        }
        roots.push(path);
    }
    roots
}

/// Production sink: invalidates the path's target node and resolves
/// it again through the protocol client.
pub struct TreeRefresher {
    tree: Arc<Mutex<VariableTree>>,
    client: Arc<dyn ProtocolClient>,
}

impl TreeRefresher {
    pub fn new(tree: Arc<Mutex<VariableTree>>, client: Arc<dyn ProtocolClient>) -> Self {
        Self { tree, client }
    }
}

impl RefreshSink for TreeRefresher {
    fn refresh(&self, path: &TreePath) {
        let id = match path.target() {
            Some(id) => id,
            None => return,
        };
        if let Ok(mut tree) = self.tree.lock() {
            crate::tree::refresh(&mut tree, id, self.client.as_ref());
        }
    }
}
