//! Progress events flowing from orchestration to the progress view
//!
//! Events travel over an unbounded channel. Their `Display`/`FromStr`
//! forms are the line protocol used in logs and by older tooling:
//!
//! ```text
//! DONE
//! COUNTERS=<n>
//! DISABLE-COUNTERS | ENABLE-COUNTERS
//! <STATUS> <logical-id> (<physical-id>)
//! ```

use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A resource changed state on the provider side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceTransition {
    pub status: String,
    pub logical: String,
    pub physical: String,
}

impl ResourceTransition {
    pub fn new(
        status: impl Into<String>,
        logical: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            logical: logical.into(),
            physical: physical.into(),
        }
    }

    /// Identity of the resource across its transitions
    pub fn key(&self) -> String {
        format!("{} {}", self.logical, self.physical)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Transition(ResourceTransition),
    /// Override the expected number of resources
    SetTotal(usize),
    /// While suppressed, completions do not advance the visible counter
    SuppressCounters(bool),
    /// The operation finished; resolve anything still pending
    Done,
}

impl ProgressEvent {
    pub fn transition(
        status: impl Into<String>,
        logical: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        ProgressEvent::Transition(ResourceTransition::new(status, logical, physical))
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Transition(t) => {
                write!(f, "{} {} ({})", t.status, t.logical, t.physical)
            }
            ProgressEvent::SetTotal(n) => write!(f, "COUNTERS={}", n),
            ProgressEvent::SuppressCounters(true) => f.write_str("DISABLE-COUNTERS"),
            ProgressEvent::SuppressCounters(false) => f.write_str("ENABLE-COUNTERS"),
            ProgressEvent::Done => f.write_str("DONE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognised progress event: {0}")]
pub struct ParseEventError(String);

impl FromStr for ProgressEvent {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        match line {
            "DONE" => return Ok(ProgressEvent::Done),
            "DISABLE-COUNTERS" => return Ok(ProgressEvent::SuppressCounters(true)),
            "ENABLE-COUNTERS" => return Ok(ProgressEvent::SuppressCounters(false)),
            _ => {}
        }
        if let Some(total) = line.strip_prefix("COUNTERS=") {
            return total
                .parse()
                .map(ProgressEvent::SetTotal)
                .map_err(|_| ParseEventError(s.to_string()));
        }

        let mut parts = line.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(status), Some(logical), Some(physical)) if !physical.is_empty() => {
                let physical = physical
                    .strip_prefix('(')
                    .and_then(|p| p.strip_suffix(')'))
                    .unwrap_or(physical);
                Ok(ProgressEvent::transition(status, logical, physical))
            }
            _ => Err(ParseEventError(s.to_string())),
        }
    }
}

/// Sending half handed to orchestration calls
pub type EventSink = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half consumed by the progress aggregator
pub type EventStream = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a sink whose consumer has gone away
pub(crate) fn emit(sink: &EventSink, event: ProgressEvent) {
    if sink.send(event).is_err() {
        tracing::trace!("Progress consumer dropped; event discarded");
    }
}

/// Relay the resource transitions of a nested operation into `sink`.
///
/// A nested operation's `Done` must not resolve the outer view, and its
/// counter controls must not override the outer operation's, so only
/// transitions and totals pass. The task ends once every clone of the
/// returned sink is dropped; await it before emitting anything that has to
/// follow the nested events.
pub(crate) fn forward_nested(sink: &EventSink) -> (EventSink, JoinHandle<()>) {
    let (nested, mut stream) = event_channel();
    let outer = sink.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            match event {
                ProgressEvent::Done | ProgressEvent::SuppressCounters(_) => {}
                event => emit(&outer, event),
            }
        }
    });
    (nested, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_tokens() {
        assert_eq!("DONE".parse::<ProgressEvent>().unwrap(), ProgressEvent::Done);
        assert_eq!(
            "COUNTERS=45".parse::<ProgressEvent>().unwrap(),
            ProgressEvent::SetTotal(45)
        );
        assert_eq!(
            "DISABLE-COUNTERS".parse::<ProgressEvent>().unwrap(),
            ProgressEvent::SuppressCounters(true)
        );
        assert!("COUNTERS=many".parse::<ProgressEvent>().is_err());
    }

    #[test]
    fn test_parse_transition() {
        let event: ProgressEvent = "CREATE_COMPLETE FlightVPC (vpc-0abc)".parse().unwrap();
        assert_eq!(
            event,
            ProgressEvent::transition("CREATE_COMPLETE", "FlightVPC", "vpc-0abc")
        );
        assert_eq!(event.to_string(), "CREATE_COMPLETE FlightVPC (vpc-0abc)");

        // bare physical ids are accepted too
        let event: ProgressEvent = "DELETE_IN_PROGRESS flight-lab-hpc flight-lab-hpc"
            .parse()
            .unwrap();
        assert_eq!(
            event,
            ProgressEvent::transition("DELETE_IN_PROGRESS", "flight-lab-hpc", "flight-lab-hpc")
        );
    }

    #[tokio::test]
    async fn test_forward_drops_done_and_counter_controls() {
        let (sink, mut stream) = event_channel();
        let (nested, task) = forward_nested(&sink);
        emit(&nested, ProgressEvent::SuppressCounters(true));
        emit(&nested, ProgressEvent::transition("DELETE_COMPLETE", "Master", "i-1"));
        emit(&nested, ProgressEvent::SuppressCounters(false));
        emit(&nested, ProgressEvent::Done);
        drop(nested);
        task.await.unwrap();
        drop(sink);

        let mut seen = Vec::new();
        while let Some(event) = stream.recv().await {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![ProgressEvent::transition("DELETE_COMPLETE", "Master", "i-1")]
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!("CREATE_COMPLETE".parse::<ProgressEvent>().is_err());
        assert!("".parse::<ProgressEvent>().is_err());
    }
}
