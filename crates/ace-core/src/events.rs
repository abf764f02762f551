//! Ordered progress events for one engine call
//!
//! Each call emits `Log`, `Chat` and `Changes` events in output order and
//! ends with exactly one `Finished` marker. Once a timeout or cancellation
//! has been observed nothing but the marker is delivered, even output that
//! was already buffered.

use crate::types::{ChangesSummary, ChatMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sending half of an event stream
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiving half of an event stream
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create an event stream
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// How a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Changes produced
    Completed,
    /// Spawn, exit or transport failure
    Failed,
    /// Deadline elapsed first
    TimedOut,
    /// Cancellation observed first
    Cancelled,
}

/// Progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Raw output line
    Log {
        /// Line without terminator
        line: String,
    },
    /// Structured conversational output
    Chat {
        /// Parsed message
        message: ChatMessage,
    },
    /// Changes produced by the call
    Changes {
        /// Same value the call returns
        summary: ChangesSummary,
    },
    /// Terminal marker, always last
    Finished {
        /// Outcome
        termination: Termination,
    },
}

impl EngineEvent {
    /// Whether this is the terminal marker
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Emitter enforcing the stream contract
///
/// Drops every event after [`finish`](Self::finish). A closed receiver
/// silently disables the emitter.
#[derive(Debug)]
pub struct EventEmitter {
    tx: Option<EventSender>,
    finished: bool,
}

impl EventEmitter {
    /// Wrap an optional sender
    #[inline]
    #[must_use]
    pub fn new(tx: Option<EventSender>) -> Self {
        Self {
            tx,
            finished: false,
        }
    }

    /// Deliver an event unless the stream is finished
    pub fn emit(&mut self, event: EngineEvent) {
        if self.finished {
            return;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver dropped");
                self.tx = None;
            }
        }
    }

    /// Raw output line
    pub fn log(&mut self, line: impl Into<String>) {
        self.emit(EngineEvent::Log { line: line.into() });
    }

    /// Chat message
    pub fn chat(&mut self, message: ChatMessage) {
        self.emit(EngineEvent::Chat { message });
    }

    /// Produced changes
    pub fn changes(&mut self, summary: ChangesSummary) {
        self.emit(EngineEvent::Changes { summary });
    }

    /// Send the terminal marker once and close the stream
    pub fn finish(&mut self, termination: Termination) {
        if self.finished {
            return;
        }
        self.emit(EngineEvent::Finished { termination });
        self.finished = true;
    }

    /// Whether the terminal marker was sent
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut EventReceiver) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn nothing_after_finish() {
        let (tx, mut rx) = event_channel();
        let mut emitter = EventEmitter::new(Some(tx));

        emitter.log("first");
        emitter.finish(Termination::Cancelled);
        emitter.log("late");
        emitter.chat(ChatMessage::assistant("late"));
        emitter.finish(Termination::TimedOut);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            EngineEvent::Finished {
                termination: Termination::Cancelled
            }
        );
        assert!(events[1].is_terminal());
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (tx, rx) = event_channel();
        drop(rx);
        let mut emitter = EventEmitter::new(Some(tx));
        emitter.log("nobody listens");
        emitter.finish(Termination::Completed);
        assert!(emitter.is_finished());
    }

    #[test]
    fn no_sender_is_a_noop() {
        let mut emitter = EventEmitter::new(None);
        emitter.log("x");
        emitter.finish(Termination::Failed);
        assert!(emitter.is_finished());
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_string(&EngineEvent::Finished {
            termination: Termination::TimedOut,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"finished","termination":"timed_out"}"#);
    }
}
