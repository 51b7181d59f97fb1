//! The hierarchical Diagnostics collector (`spec.md` §4.12 "Diagnostics
//! (C12)").
//!
//! A single-writer span tree plus a flat event/counter log, grounded on the
//! teacher's `GraphicsStates` idea of a stack that tracks "what's current"
//! separately from "what exists" -- here the stack is `span_stack` (current
//! call-site nesting) layered over `spans` (every span ever opened, closed
//! or not). Worker subtrees are merged in with their ids remapped into a
//! fresh range, same shape as the teacher's resource-numbering remap when
//! embedding one document's objects into another.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Returned by [`Diagnostics::start_span`] / [`Diagnostics::start_nested_span`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanHandle {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpanStatus {
    Open,
    Closed,
    Aborted { reason: AbortReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    Reason(String),
    Timeout { elapsed_ms: f64 },
}

/// A merged attribute/metric value (`spec.md` §4.12 `updateSpan`: "merges:
/// numeric -> metrics, others -> attributes").
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl AttrValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub attrs: HashMap<String, AttrValue>,
    pub metrics: HashMap<String, f64>,
    pub status: SpanStatus,
    pub start: Duration,
    pub end: Option<Duration>,
}

impl SpanRecord {
    fn self_time(&self) -> f64 {
        self.end.unwrap_or(self.start).saturating_sub(self.start).as_secs_f64()
    }
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub name: String,
    pub data: HashMap<String, AttrValue>,
    pub at: Duration,
}

/// A pending timeout sweep for one root span's still-open descendants
/// (`spec.md` §4.12 "Root-span timeout").
struct PendingSweep {
    root_id: u64,
    due_at: Duration,
}

/// The default base used in `gracefulCleanupTimeout x descendantCount`
/// (`spec.md` §4.12: "default 1000 ms base").
const DEFAULT_GRACEFUL_CLEANUP_TIMEOUT_MS: u64 = 1000;

/// Auxiliary (worker) collectors are started at this id to keep their
/// local id space from colliding with the main collector's
/// (`spec.md` §4.12: "Auxiliary workers are started at id = 100000").
pub const AUX_WORKER_ID_BASE: u64 = 100_000;

/// A full snapshot produced by [`Diagnostics::serialize`], ready to be
/// folded into a parent collector via [`Diagnostics::merge`].
pub struct SerializedDiagnostics {
    pub spans: Vec<SpanRecord>,
    pub events: Vec<EventRecord>,
    pub counters: HashMap<String, f64>,
}

pub struct Diagnostics {
    start_time: Instant,
    spans: Vec<SpanRecord>,
    id_index: HashMap<u64, usize>,
    span_stack: Vec<u64>,
    events: Vec<EventRecord>,
    counters: HashMap<String, f64>,
    next_id: u64,
    graceful_cleanup_timeout_ms: u64,
    pending_sweeps: Vec<PendingSweep>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            spans: Vec::new(),
            id_index: HashMap::new(),
            span_stack: Vec::new(),
            events: Vec::new(),
            counters: HashMap::new(),
            next_id: 1,
            graceful_cleanup_timeout_ms: DEFAULT_GRACEFUL_CLEANUP_TIMEOUT_MS,
            pending_sweeps: Vec::new(),
        }
    }

    pub fn with_graceful_cleanup_timeout_ms(mut self, ms: u64) -> Self {
        self.graceful_cleanup_timeout_ms = ms;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        self.id_index.get(&id).copied()
    }

    /// `spec.md` §4.12 `startSpan(name, attrs)`: "pushes current; returns
    /// handle {id, name}".
    pub fn start_span(&mut self, name: impl Into<String>, attrs: HashMap<String, AttrValue>) -> SpanHandle {
        let parent_id = self.span_stack.last().copied();
        self.push_span(name, attrs, parent_id, true)
    }

    /// `spec.md` §4.12 `startNestedSpan(parentHandle, name, attrs)`: "does
    /// not modify current span; for concurrent operations (worker
    /// fan-out)".
    pub fn start_nested_span(
        &mut self,
        parent: &SpanHandle,
        name: impl Into<String>,
        attrs: HashMap<String, AttrValue>,
    ) -> SpanHandle {
        self.push_span(name, attrs, Some(parent.id), false)
    }

    fn push_span(
        &mut self,
        name: impl Into<String>,
        attrs: HashMap<String, AttrValue>,
        parent_id: Option<u64>,
        becomes_current: bool,
    ) -> SpanHandle {
        let id = self.alloc_id();
        let name = name.into();
        let record = SpanRecord {
            id,
            parent_id,
            name: name.clone(),
            attrs,
            metrics: HashMap::new(),
            status: SpanStatus::Open,
            start: self.elapsed(),
            end: None,
        };
        self.id_index.insert(id, self.spans.len());
        self.spans.push(record);
        if becomes_current {
            self.span_stack.push(id);
        }
        SpanHandle { id, name }
    }

    /// `spec.md` §4.12 `endSpan(handle, metrics)`: "no-op if already closed;
    /// only pops current if closing the current span (concurrent-safe)".
    pub fn end_span(&mut self, handle: &SpanHandle, metrics: HashMap<String, f64>) {
        let Some(idx) = self.index_of(handle.id) else { return };
        if !matches!(self.spans[idx].status, SpanStatus::Open) {
            return;
        }
        self.spans[idx].status = SpanStatus::Closed;
        self.spans[idx].end = Some(self.elapsed());
        self.spans[idx].metrics.extend(metrics);

        if self.span_stack.last() == Some(&handle.id) {
            self.span_stack.pop();
        }

        let is_root = self.spans[idx].parent_id.is_none();
        if is_root {
            self.schedule_root_timeout_sweep(handle.id);
        }
    }

    /// `spec.md` §4.12 `updateSpan(handle, data)`.
    pub fn update_span(&mut self, handle: &SpanHandle, data: HashMap<String, AttrValue>) {
        let Some(idx) = self.index_of(handle.id) else { return };
        for (key, value) in data {
            match value.as_number() {
                Some(n) => {
                    self.spans[idx].metrics.insert(key, n);
                }
                None => {
                    self.spans[idx].attrs.insert(key, value);
                }
            }
        }
    }

    /// `spec.md` §4.12 `abortSpan(handle, {reason | timeout})`.
    pub fn abort_span(&mut self, handle: &SpanHandle, reason: AbortReason) {
        let Some(idx) = self.index_of(handle.id) else { return };
        if matches!(self.spans[idx].status, SpanStatus::Closed) {
            return;
        }
        self.spans[idx].status = SpanStatus::Aborted { reason };
        if self.spans[idx].end.is_none() {
            self.spans[idx].end = Some(self.elapsed());
        }
        if self.span_stack.last() == Some(&handle.id) {
            self.span_stack.pop();
        }
    }

    pub fn increment_counter(&mut self, name: impl Into<String>, delta: f64) {
        *self.counters.entry(name.into()).or_insert(0.0) += delta;
    }

    pub fn record_event(&mut self, name: impl Into<String>, data: HashMap<String, AttrValue>) {
        self.events.push(EventRecord {
            name: name.into(),
            data,
            at: self.elapsed(),
        });
    }

    fn descendant_ids(&self, root_id: u64) -> Vec<u64> {
        let mut out = Vec::new();
        let mut frontier = vec![root_id];
        while let Some(parent) = frontier.pop() {
            for span in &self.spans {
                if span.parent_id == Some(parent) {
                    out.push(span.id);
                    frontier.push(span.id);
                }
            }
        }
        out
    }

    /// `spec.md` §4.12 "Root-span timeout": "when a root span ends, look at
    /// all still-open descendants; schedule a sweep after
    /// gracefulCleanupTimeout x descendantCount".
    fn schedule_root_timeout_sweep(&mut self, root_id: u64) {
        let descendants = self.descendant_ids(root_id);
        let open_count = descendants
            .iter()
            .filter(|id| {
                self.index_of(**id)
                    .map(|idx| matches!(self.spans[idx].status, SpanStatus::Open))
                    .unwrap_or(false)
            })
            .count();
        if open_count == 0 {
            return;
        }
        let delay = Duration::from_millis(self.graceful_cleanup_timeout_ms * open_count as u64);
        self.pending_sweeps.push(PendingSweep {
            root_id,
            due_at: self.elapsed() + delay,
        });
    }

    /// Runs every sweep whose deadline has passed as of `now`, aborting
    /// each remaining open descendant with `{timeout: elapsedMs}`
    /// (`spec.md` §4.12). `now` is the collector's own elapsed-time clock
    /// (see [`Diagnostics::elapsed`]); callers drive this from a real
    /// timer, tests pass a synthetic value directly.
    pub fn run_due_sweeps(&mut self, now: Duration) {
        let due: Vec<u64> = self
            .pending_sweeps
            .iter()
            .filter(|sweep| sweep.due_at <= now)
            .map(|sweep| sweep.root_id)
            .collect();
        self.pending_sweeps.retain(|sweep| sweep.due_at > now);

        for root_id in due {
            for descendant in self.descendant_ids(root_id) {
                if let Some(idx) = self.index_of(descendant) {
                    if matches!(self.spans[idx].status, SpanStatus::Open) {
                        let elapsed_ms = (now.saturating_sub(self.spans[idx].start)).as_secs_f64() * 1000.0;
                        self.spans[idx].status = SpanStatus::Aborted {
                            reason: AbortReason::Timeout { elapsed_ms },
                        };
                        self.spans[idx].end = Some(now);
                    }
                }
            }
        }
    }

    /// `spec.md` §4.12 `serialize()`.
    pub fn serialize(&self) -> SerializedDiagnostics {
        SerializedDiagnostics {
            spans: self.spans.clone(),
            events: self.events.clone(),
            counters: self.counters.clone(),
        }
    }

    /// `spec.md` §4.12 `merge(serialized, parentSpanId?)`: "worker subtrees
    /// carry their own span ids; on merge, ids are remapped to a fresh
    /// range and timestamps are shifted to the main clock by
    /// `workerStart - mainStart`".
    ///
    /// `clock_offset` is that `workerStart - mainStart` delta, expressed as
    /// a signed millisecond count (positive if the worker's clock started
    /// after the main collector's).
    pub fn merge(&mut self, serialized: SerializedDiagnostics, parent_span_id: Option<u64>, clock_offset_ms: i64) {
        let mut id_map: HashMap<u64, u64> = HashMap::new();
        for span in &serialized.spans {
            id_map.insert(span.id, self.alloc_id());
        }

        let shift = |d: Duration| -> Duration {
            let millis = d.as_millis() as i64 + clock_offset_ms;
            Duration::from_millis(millis.max(0) as u64)
        };

        for span in serialized.spans {
            let new_id = id_map[&span.id];
            let new_parent = match span.parent_id {
                Some(old_parent) => id_map.get(&old_parent).copied().or(parent_span_id),
                None => parent_span_id,
            };
            let record = SpanRecord {
                id: new_id,
                parent_id: new_parent,
                name: span.name,
                attrs: span.attrs,
                metrics: span.metrics,
                status: span.status,
                start: shift(span.start),
                end: span.end.map(shift),
            };
            self.id_index.insert(new_id, self.spans.len());
            self.spans.push(record);
        }

        for event in serialized.events {
            self.events.push(EventRecord {
                name: event.name,
                data: event.data,
                at: shift(event.at),
            });
        }

        for (name, value) in serialized.counters {
            *self.counters.entry(name).or_insert(0.0) += value;
        }
    }

    fn children_of(&self, parent: Option<u64>) -> Vec<&SpanRecord> {
        self.spans.iter().filter(|s| s.parent_id == parent).collect()
    }

    fn inclusive_time(&self, span: &SpanRecord) -> f64 {
        let mut total = span.self_time();
        for child in self.children_of(Some(span.id)) {
            total += self.inclusive_time(child);
        }
        total
    }

    /// Output format (a): "hierarchical machine JSON compatible with a
    /// profile-viewer tool, with metrics `time` (self-time, seconds) and
    /// `time (inc)` (inclusive)" (`spec.md` §4.12).
    pub fn to_hierarchical_json(&self) -> String {
        fn write_span(diag: &Diagnostics, span: &SpanRecord, out: &mut String) {
            out.push('{');
            out.push_str(&format!("\"id\":{},", span.id));
            out.push_str(&format!("\"name\":{:?},", span.name));
            out.push_str(&format!("\"status\":{:?},", status_label(&span.status)));
            out.push_str(&format!(
                "\"metrics\":{{\"time\":{},\"time (inc)\":{}",
                span.self_time(),
                diag.inclusive_time(span)
            ));
            for (k, v) in &span.metrics {
                out.push_str(&format!(",{k:?}:{v}"));
            }
            out.push_str("},\"children\":[");
            let children = diag.children_of(Some(span.id));
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_span(diag, child, out);
            }
            out.push_str("]}");
        }

        let mut out = String::from("[");
        let roots = self.children_of(None);
        for (i, root) in roots.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_span(self, root, &mut out);
        }
        out.push(']');
        out
    }

    /// Output format (b): "human tree-print with ASCII branches and inline
    /// metrics" (`spec.md` §4.12).
    pub fn to_tree_string(&self) -> String {
        fn write_span(diag: &Diagnostics, span: &SpanRecord, prefix: &str, is_last: bool, out: &mut String) {
            let connector = if is_last { "\\-- " } else { "|-- " };
            out.push_str(prefix);
            out.push_str(connector);
            out.push_str(&format!(
                "{} [{}] time={:.3}s inc={:.3}s\n",
                span.name,
                status_label(&span.status),
                span.self_time(),
                diag.inclusive_time(span)
            ));
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "|   " });
            let children = diag.children_of(Some(span.id));
            for (i, child) in children.iter().enumerate() {
                write_span(diag, child, &child_prefix, i == children.len() - 1, out);
            }
        }

        let mut out = String::new();
        let roots = self.children_of(None);
        for (i, root) in roots.iter().enumerate() {
            write_span(self, root, "", i == roots.len() - 1, &mut out);
        }
        out
    }

    /// Output format (c): "flat trace-log chronologically sorted"
    /// (`spec.md` §4.12).
    pub fn to_trace_log(&self) -> Vec<String> {
        #[derive(Clone)]
        enum Entry<'a> {
            SpanStart(&'a SpanRecord),
            SpanEnd(&'a SpanRecord),
            Event(&'a EventRecord),
        }

        let mut entries: Vec<(Duration, Entry)> = Vec::new();
        for span in &self.spans {
            entries.push((span.start, Entry::SpanStart(span)));
            if let Some(end) = span.end {
                entries.push((end, Entry::SpanEnd(span)));
            }
        }
        for event in &self.events {
            entries.push((event.at, Entry::Event(event)));
        }
        entries.sort_by_key(|(at, _)| *at);

        entries
            .into_iter()
            .map(|(at, entry)| match entry {
                Entry::SpanStart(span) => format!("{:>10.3}  span-start  {}", at.as_secs_f64(), span.name),
                Entry::SpanEnd(span) => format!(
                    "{:>10.3}  span-end    {} [{}]",
                    at.as_secs_f64(),
                    span.name,
                    status_label(&span.status)
                ),
                Entry::Event(event) => format!("{:>10.3}  event       {}", at.as_secs_f64(), event.name),
            })
            .collect()
    }

    pub fn counters(&self) -> &HashMap<String, f64> {
        &self.counters
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

fn status_label(status: &SpanStatus) -> &'static str {
    match status {
        SpanStatus::Open => "open",
        SpanStatus::Closed => "closed",
        SpanStatus::Aborted { .. } => "aborted",
    }
}
