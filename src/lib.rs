//! Variable-inspection and output-rendering engine for a debug
//! console: turns a debug adapter's scopes/variables and streamed
//! process output into a lazily-resolved tree plus an append-only
//! styled log, with ANSI SGR interpretation and batched refreshes.

pub mod ansi;
pub mod console;
pub mod protocol;
pub mod tree;

pub use ansi::{interpret, LinkDetector, Rgba, SpanColor, StyleClasses, StyledSpan, ThemeColors};
pub use console::{
    EntryId, EntryKind, Generation, OutputEntry, OutputLog, RefreshScheduler, RefreshSink,
    Severity, TreeRefresher,
};
pub use protocol::{
    EvaluateContext, EvaluateResponse, OutputCategory, OutputEvent, ProtocolClient, ProtocolError,
    SetVariableResponse, Source, Variable, VariablesArguments, VariablesFilter,
};
pub use tree::{chunk_size_for, NodeId, NodeKind, TreePath, VariableTree};
