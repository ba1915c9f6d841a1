mod log;
mod scheduler;

pub use log::{EntryId, EntryKind, Generation, OutputEntry, OutputLog, Severity};
pub use scheduler::{prune_to_roots, RefreshScheduler, RefreshSink, TreeRefresher};
