use crate::ansi::{interpret, StyledSpan};
use crate::protocol::{
    EvaluateContext, EvaluateResponse, OutputCategory, OutputEvent, ProtocolClient, ProtocolError,
    Source,
};
use crate::tree::{NodeId, VariableTree};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_NOTIFY_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Index of an entry in the append-only list.
pub type EntryId = usize;

/// Monotonic token for user-driven evaluations. A newer token
/// supersedes all older ones; results tagged with a stale token are
/// dropped on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Styled text line. `open` marks a streamed line that has not
    /// seen its terminator yet and may still be merged into.
    Text {
        raw: String,
        spans: Vec<StyledSpan>,
        open: bool,
    },
    /// Expandable sub-tree rooted at an arena node.
    Tree { node: NodeId },
    /// Evaluation in flight; replaced in place when it completes.
    Pending { expression: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
    pub kind: EntryKind,
    pub severity: Severity,
    pub source: Option<Source>,
    pub line: Option<u32>,
}

impl OutputEntry {
    pub fn text(raw: &str, severity: Severity) -> Self {
        Self {
            kind: EntryKind::Text {
                raw: raw.to_string(),
                spans: interpret(raw),
                open: false,
            },
            severity,
            source: None,
            line: None,
        }
    }
}

/// Append-only console log. Exclusively owns the entry order; tree
/// entries point into a `VariableTree` owned by the host.
pub struct OutputLog {
    entries: Vec<OutputEntry>,
    notifier: Notifier,
    generation: u64,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLog {
    pub fn new() -> Self {
        Self::with_notify_window(DEFAULT_NOTIFY_WINDOW)
    }

    pub fn with_notify_window(window: Duration) -> Self {
        Self {
            entries: Vec::new(),
            notifier: Notifier::new(window),
            generation: 0,
        }
    }

    pub fn entries(&self) -> &[OutputEntry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&OutputEntry> {
        self.entries.get(id)
    }

    /// Observers get one coalesced `()` per change burst rather than
    /// one per entry.
    pub fn subscribe(&self) -> Receiver<()> {
        self.notifier.subscribe()
    }

    pub fn append(&mut self, entry: OutputEntry) -> EntryId {
        self.entries.push(entry);
        self.notifier.notify();
        self.entries.len() - 1
    }

    /// Append complete text. Embedded newlines split into one entry
    /// per line; never merges with a preceding partial.
    pub fn append_line(&mut self, text: &str, severity: Severity) {
        let mut parts: Vec<&str> = text.split('\n').collect();
        if parts.last() == Some(&"") {
            parts.pop();
        }
        for line in parts {
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.entries.push(OutputEntry::text(line, severity));
        }
        self.notifier.notify();
    }

    /// Append streamed text. Merges into the previous entry when that
    /// entry is textual, came from a prior partial append, and had no
    /// trailing line terminator. Each newline closes the open line.
    pub fn append_partial(&mut self, text: &str, severity: Severity) {
        self.append_partial_with(text, severity, None, None);
    }

    pub fn append_partial_with(
        &mut self,
        text: &str,
        severity: Severity,
        source: Option<Source>,
        line: Option<u32>,
    ) {
        let mergeable = matches!(
            self.entries.last(),
            Some(entry) if entry.severity == severity
                && matches!(entry.kind, EntryKind::Text { open: true, .. })
        );
        let prior = if mergeable {
            match self.entries.pop() {
                Some(OutputEntry {
                    kind: EntryKind::Text { raw, .. },
                    ..
                }) => raw,
                _ => String::new(),
            }
        } else {
            String::new()
        };

        let mut rest = format!("{prior}{text}");
        while let Some(pos) = rest.find('\n') {
            let tail = rest.split_off(pos + 1);
            let closed = rest.strip_suffix('\n').unwrap_or(&rest);
            let closed = closed.strip_suffix('\r').unwrap_or(closed);
            self.entries.push(OutputEntry {
                kind: EntryKind::Text {
                    raw: closed.to_string(),
                    spans: interpret(closed),
                    open: false,
                },
                severity,
                source: source.clone(),
                line,
            });
            rest = tail;
        }
        if !rest.is_empty() {
            self.entries.push(OutputEntry {
                kind: EntryKind::Text {
                    spans: interpret(&rest),
                    raw: rest,
                    open: true,
                },
                severity,
                source,
                line,
            });
        }
        self.notifier.notify();
    }

    pub fn append_tree(
        &mut self,
        node: NodeId,
        severity: Severity,
        source: Option<Source>,
        line: Option<u32>,
    ) -> EntryId {
        self.append(OutputEntry {
            kind: EntryKind::Tree { node },
            severity,
            source,
            line,
        })
    }

    /// Route one adapter `output` event. Telemetry is logged and never
    /// becomes an entry; a reference handle turns the text into an
    /// expandable sub-tree. Returns the created node, if any.
    pub fn handle_output(&mut self, event: &OutputEvent, tree: &mut VariableTree) -> Option<NodeId> {
        if event.category == OutputCategory::Telemetry {
            tracing::debug!(
                output = %event.output.trim_end(),
                data = ?event.data,
                "telemetry output suppressed"
            );
            return None;
        }
        let severity = match event.category {
            OutputCategory::Stderr => Severity::Error,
            _ => Severity::Info,
        };
        match event.variables_reference {
            Some(reference) if reference > 0 => {
                let node = tree.new_container(
                    event.output.trim_end_matches(['\r', '\n']),
                    reference,
                    event.source.clone(),
                    event.line,
                );
                self.append_tree(node, severity, event.source.clone(), event.line);
                Some(node)
            }
            _ => {
                self.append_partial_with(
                    &event.output,
                    severity,
                    event.source.clone(),
                    event.line,
                );
                None
            }
        }
    }

    /// First phase of `evaluate`: append a pending entry and take a
    /// fresh generation token, superseding any outstanding one.
    pub fn begin_evaluation(&mut self, expression: &str) -> (EntryId, Generation) {
        self.generation += 1;
        let id = self.append(OutputEntry {
            kind: EntryKind::Pending {
                expression: expression.to_string(),
            },
            severity: Severity::Info,
            source: None,
            line: None,
        });
        (id, Generation(self.generation))
    }

    /// Second phase: replace the pending entry in place. A stale
    /// generation means a newer evaluation superseded this one; the
    /// result is dropped, not applied.
    pub fn finish_evaluation(
        &mut self,
        entry: EntryId,
        generation: Generation,
        result: Result<EvaluateResponse, ProtocolError>,
        tree: &mut VariableTree,
    ) {
        if generation.0 != self.generation {
            tracing::debug!(entry, "dropping stale evaluation result");
            return;
        }
        let expression = match self.entries.get(entry) {
            Some(OutputEntry {
                kind: EntryKind::Pending { expression },
                ..
            }) => expression.clone(),
            _ => return,
        };
        match result {
            Ok(response) => {
                let node = tree.new_evaluation(&expression, &response);
                self.entries[entry].kind = EntryKind::Tree { node };
                self.entries[entry].severity = Severity::Info;
            }
            Err(err) => {
                tracing::warn!(expression = %expression, error = %err, "evaluate failed");
                let message = err.to_string();
                self.entries[entry].kind = EntryKind::Text {
                    spans: vec![StyledSpan::plain(message.clone())],
                    raw: message,
                    open: false,
                };
                self.entries[entry].severity = Severity::Error;
            }
        }
        self.notifier.notify();
    }

    /// Both phases back to back, for hosts that drive the client
    /// synchronously.
    pub fn evaluate(
        &mut self,
        expression: &str,
        client: &dyn ProtocolClient,
        tree: &mut VariableTree,
    ) -> EntryId {
        let (entry, generation) = self.begin_evaluation(expression);
        let result = client.evaluate(expression, EvaluateContext::Repl);
        self.finish_evaluation(entry, generation, result, tree);
        entry
    }
}

/// Explicit observer list with a trailing-edge throttle: the first
/// change in a window notifies immediately, the rest of the burst is
/// coalesced into one notification when the window closes.
struct Notifier {
    inner: Arc<Mutex<NotifierInner>>,
    window: Duration,
}

struct NotifierInner {
    observers: Vec<Sender<()>>,
    last_emit: Option<Instant>,
    trailing_armed: bool,
}

impl Notifier {
    fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NotifierInner {
                observers: Vec::new(),
                last_emit: None,
                trailing_armed: false,
            })),
            window,
        }
    }

    fn subscribe(&self) -> Receiver<()> {
        let (tx, rx) = channel();
        if let Ok(mut inner) = self.inner.lock() {
            inner.observers.push(tx);
        }
        rx
    }

    fn notify(&self) {
        let delay = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(_) => return,
            };
            let now = Instant::now();
            match inner.last_emit {
                Some(last) if now.duration_since(last) < self.window => {
                    if inner.trailing_armed {
                        return;
                    }
                    inner.trailing_armed = true;
                    Some(self.window - now.duration_since(last))
                }
                _ => {
                    inner.last_emit = Some(now);
                    inner.emit();
                    None
                }
            }
        };

        if let Some(delay) = delay {
            let shared = Arc::clone(&self.inner);
            thread::spawn(move || {
                thread::sleep(delay);
                if let Ok(mut inner) = shared.lock() {
                    inner.trailing_armed = false;
                    inner.last_emit = Some(Instant::now());
                    inner.emit();
                }
            });
        }
    }
}

impl NotifierInner {
    fn emit(&mut self) {
        // Dropped receivers are pruned as they surface.
        self.observers.retain(|tx| tx.send(()).is_ok());
    }
}
