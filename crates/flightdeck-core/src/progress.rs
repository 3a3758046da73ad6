//! Live progress rendering for stack operations
//!
//! Each resource gets one line: `⏳  Name` when it starts, rewritten in
//! place to `✅  Name` (or `❎  Name` when destroying) once it completes.
//! A counter `(done/total)` rides along on the spinner.

use crate::events::{EventStream, ProgressEvent, ResourceTransition};
use crossterm::cursor::{MoveDown, MoveToColumn, MoveUp};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const PENDING_GLYPH: &str = "⏳";

/// Which status pair an operation reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Create,
    Destroy,
}

impl ProgressMode {
    pub fn in_progress(self) -> &'static str {
        match self {
            ProgressMode::Create => "CREATE_IN_PROGRESS",
            ProgressMode::Destroy => "DELETE_IN_PROGRESS",
        }
    }

    pub fn complete(self) -> &'static str {
        match self {
            ProgressMode::Create => "CREATE_COMPLETE",
            ProgressMode::Destroy => "DELETE_COMPLETE",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            ProgressMode::Create => "✅",
            ProgressMode::Destroy => "❎",
        }
    }
}

/// Output surface of the aggregator
pub trait ProgressView: Send {
    /// Append a line below everything printed so far
    fn print_line(&mut self, line: &str);

    /// Replace the line `lines_up` lines above the current position
    fn rewrite_line(&mut self, lines_up: usize, line: &str);

    /// Show the completion counter, e.g. ` (3/45)`; empty clears it
    fn set_counter(&mut self, counter: &str);

    /// The operation has finished
    fn finish(&mut self) {}
}

#[derive(Debug, Default)]
struct Tracker {
    /// Resource keys in the order their lines were printed
    lines: Vec<String>,
    line_of: HashMap<String, usize>,
    completed: HashSet<String>,
    /// Completions that happened while counters were suppressed
    delta: usize,
    suppressed: bool,
    total: usize,
    counter: Option<String>,
}

impl Tracker {
    fn register(&mut self, key: String) {
        self.line_of.insert(key.clone(), self.lines.len());
        self.lines.push(key);
    }

    /// Lines between the bottom and `key`'s line, inclusive
    fn distance(&self, key: &str) -> Option<usize> {
        self.line_of.get(key).map(|idx| self.lines.len() - idx)
    }
}

/// Turns the event stream of one operation into terminal output
pub struct ProgressAggregator<V: ProgressView> {
    mode: ProgressMode,
    inner: Mutex<(Tracker, V)>,
}

impl<V: ProgressView> ProgressAggregator<V> {
    pub fn new(mode: ProgressMode, total: usize, view: V) -> Self {
        let tracker = Tracker {
            total,
            ..Tracker::default()
        };
        Self {
            mode,
            inner: Mutex::new((tracker, view)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, (Tracker, V)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drain `stream` until every sender is gone
    pub async fn consume(&self, mut stream: EventStream) {
        while let Some(event) = stream.recv().await {
            self.handle(&event);
        }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        tracing::trace!(%event, "progress");
        let mut guard = self.lock();
        let (tracker, view) = &mut *guard;
        match event {
            ProgressEvent::SetTotal(total) => tracker.total = *total,
            ProgressEvent::SuppressCounters(suppressed) => tracker.suppressed = *suppressed,
            ProgressEvent::Done => self.resolve_pending(tracker, view),
            ProgressEvent::Transition(t) => self.transition(tracker, view, t),
        }
    }

    fn transition(&self, tracker: &mut Tracker, view: &mut V, t: &ResourceTransition) {
        let key = t.key();
        if t.status == self.mode.in_progress() {
            if !tracker.line_of.contains_key(&key) {
                view.print_line(&format!("{}  {}", PENDING_GLYPH, t.logical));
                tracker.register(key);
            }
            return;
        }
        if t.status != self.mode.complete() || tracker.completed.contains(&key) {
            return;
        }

        let line = format!("{}  {}", self.mode.glyph(), t.logical);
        match tracker.distance(&key) {
            Some(lines_up) => view.rewrite_line(lines_up, &line),
            None => {
                view.print_line(&line);
                tracker.register(key.clone());
            }
        }
        if tracker.suppressed {
            tracker.delta += 1;
        }
        tracker.completed.insert(key);

        if tracker.total > 0 && !tracker.suppressed {
            let counter = format!(
                "({}/{})",
                tracker.completed.len().saturating_sub(tracker.delta),
                tracker.total
            );
            view.set_counter(&format!(" {}", counter));
            tracker.counter = Some(counter);
        }
    }

    /// Mark every started-but-unfinished line complete
    fn resolve_pending(&self, tracker: &mut Tracker, view: &mut V) {
        let pending: Vec<String> = tracker
            .lines
            .iter()
            .filter(|key| !tracker.completed.contains(*key))
            .cloned()
            .collect();
        for key in pending {
            if let Some(lines_up) = tracker.distance(&key) {
                let name = key.split(' ').next().unwrap_or(&key);
                view.rewrite_line(lines_up, &format!("{}  {}", self.mode.glyph(), name));
            }
            tracker.completed.insert(key);
        }
        view.set_counter("");
        view.finish();
    }

    /// Last counter shown, e.g. `(3/45)`
    pub fn counter(&self) -> Option<String> {
        self.lock().0.counter.clone()
    }

    pub fn into_view(self) -> V {
        self.inner.into_inner().unwrap_or_else(|e| e.into_inner()).1
    }
}

/// Spinner on stderr with resource lines printed above it
pub struct TerminalView {
    spinner: ProgressBar,
    label: String,
}

impl TerminalView {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(label.clone());
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner, label }
    }
}

fn rows(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

impl ProgressView for TerminalView {
    fn print_line(&mut self, line: &str) {
        self.spinner.suspend(|| println!("{}", line));
    }

    fn rewrite_line(&mut self, lines_up: usize, line: &str) {
        self.spinner.suspend(|| {
            let mut out = std::io::stdout();
            let _ = execute!(
                out,
                MoveUp(rows(lines_up)),
                MoveToColumn(0),
                Clear(ClearType::CurrentLine)
            );
            let _ = writeln!(out, "{}", line);
            if lines_up > 1 {
                let _ = execute!(out, MoveDown(rows(lines_up - 1)));
            }
            let _ = out.flush();
        });
    }

    fn set_counter(&mut self, counter: &str) {
        self.spinner.set_message(format!("{}{}", self.label, counter));
    }

    fn finish(&mut self) {
        self.spinner.set_message(self.label.clone());
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

/// Rendered state of a [`MemoryView`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    pub lines: Vec<String>,
    pub counter: String,
    pub finished: bool,
}

/// In-memory view; clones share the same screen
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    screen: Arc<Mutex<Screen>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Screen) -> R) -> R {
        f(&mut self.screen.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ProgressView for MemoryView {
    fn print_line(&mut self, line: &str) {
        self.with(|s| s.lines.push(line.to_string()));
    }

    fn rewrite_line(&mut self, lines_up: usize, line: &str) {
        self.with(|s| {
            if let Some(idx) = s.lines.len().checked_sub(lines_up) {
                if let Some(slot) = s.lines.get_mut(idx) {
                    *slot = line.to_string();
                }
            }
        });
    }

    fn set_counter(&mut self, counter: &str) {
        self.with(|s| s.counter = counter.to_string());
    }

    fn finish(&mut self) {
        self.with(|s| s.finished = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(logical: &str) -> ProgressEvent {
        ProgressEvent::transition("CREATE_IN_PROGRESS", logical, format!("{}-id", logical))
    }

    fn completed(logical: &str) -> ProgressEvent {
        ProgressEvent::transition("CREATE_COMPLETE", logical, format!("{}-id", logical))
    }

    #[test]
    fn test_lines_rewritten_in_place() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 3, view.clone());

        agg.handle(&started("FlightVPC"));
        agg.handle(&started("PubSubnet"));
        agg.handle(&started("PubSubnet"));
        agg.handle(&completed("FlightVPC"));

        let screen = view.screen();
        assert_eq!(screen.lines, vec!["✅  FlightVPC", "⏳  PubSubnet"]);
        assert_eq!(screen.counter, " (1/3)");
    }

    #[test]
    fn test_duplicate_completion_ignored() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 5, view.clone());

        agg.handle(&started("FlightVPC"));
        agg.handle(&completed("FlightVPC"));
        agg.handle(&completed("FlightVPC"));

        assert_eq!(agg.counter().as_deref(), Some("(1/5)"));
        assert_eq!(view.screen().lines.len(), 1);
    }

    #[test]
    fn test_unseen_completion_printed_fresh() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Destroy, 0, view.clone());

        agg.handle(&ProgressEvent::transition(
            "DELETE_COMPLETE",
            "MasterInstance",
            "i-0abc",
        ));
        let screen = view.screen();
        assert_eq!(screen.lines, vec!["❎  MasterInstance"]);
        // no counter without a total
        assert_eq!(screen.counter, "");
        assert_eq!(agg.counter(), None);
    }

    #[test]
    fn test_other_statuses_ignored() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 5, view.clone());
        agg.handle(&ProgressEvent::transition("CREATE_FAILED", "FlightVPC", "vpc-1"));
        agg.handle(&ProgressEvent::transition("DELETE_COMPLETE", "FlightVPC", "vpc-1"));
        assert!(view.screen().lines.is_empty());
    }

    #[test]
    fn test_counter_suppression() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 5, view.clone());

        for name in ["A", "B", "C"] {
            agg.handle(&started(name));
        }
        agg.handle(&ProgressEvent::SuppressCounters(true));
        agg.handle(&completed("A"));
        agg.handle(&completed("B"));
        agg.handle(&ProgressEvent::SuppressCounters(false));
        agg.handle(&completed("C"));

        assert_eq!(agg.counter().as_deref(), Some("(1/5)"));
        assert_eq!(view.screen().counter, " (1/5)");
    }

    #[test]
    fn test_total_override() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 35, view);
        agg.handle(&ProgressEvent::SetTotal(37));
        agg.handle(&completed("FlightVPC"));
        assert_eq!(agg.counter().as_deref(), Some("(1/37)"));
    }

    #[test]
    fn test_done_resolves_pending_lines() {
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 3, view.clone());

        agg.handle(&started("FlightVPC"));
        agg.handle(&started("PubSubnet"));
        agg.handle(&started("MgtSubnet"));
        agg.handle(&completed("PubSubnet"));
        agg.handle(&ProgressEvent::Done);

        let screen = view.screen();
        assert_eq!(
            screen.lines,
            vec!["✅  FlightVPC", "✅  PubSubnet", "✅  MgtSubnet"]
        );
        assert!(screen.finished);
        assert_eq!(screen.counter, "");
    }

    #[tokio::test]
    async fn test_consume_stream() {
        let (sink, stream) = crate::events::event_channel();
        let view = MemoryView::new();
        let agg = ProgressAggregator::new(ProgressMode::Create, 2, view.clone());

        sink.send(started("FlightVPC")).unwrap();
        sink.send(completed("FlightVPC")).unwrap();
        sink.send(ProgressEvent::Done).unwrap();
        drop(sink);
        agg.consume(stream).await;

        assert_eq!(view.screen().lines, vec!["✅  FlightVPC"]);
        assert_eq!(agg.counter().as_deref(), Some("(1/2)"));
    }
}
