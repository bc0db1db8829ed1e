use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

use crate::dispatch::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Normal,
    Warning,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Normal => f.pad("Normal"),
            EventKind::Warning => f.pad("Warning"),
        }
    }
}

/// One reported fact about a command on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub command: String,
    pub node: String,
    pub kind: EventKind,
    /// `<command>-<node>`
    pub reason: String,
    pub message: String,
}

impl Event {
    fn new(command: &str, node: &str, kind: EventKind, message: String) -> Self {
        Self {
            command: command.to_string(),
            node: node.to_string(),
            kind,
            reason: format!("{command}-{node}"),
            message,
        }
    }

    /// Advisory for a selected node that has no reachable agent.
    pub fn agent_unavailable(command: &str, node: &str) -> Self {
        Self::new(
            command,
            node,
            EventKind::Warning,
            format!("Agent not found for node {node} (skipping)"),
        )
    }

    /// Event for the outcome of dispatching `command_text` to `node`.
    ///
    /// The output header names the node as the agent reported it, falling
    /// back to `node` when the agent did not say.
    pub fn from_outcome(command: &str, command_text: &str, node: &str, outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success(result) => {
                let reported = result
                    .node_name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(node);
                let mut header = format!("[{reported}] ❯ {command_text}");
                if !result.succeeded() {
                    header.push_str(&format!(" (exit {})", result.exit_code));
                }
                Self::new(
                    command,
                    node,
                    EventKind::Normal,
                    format!("{header}\n{}", result.output_lossy()),
                )
            }
            Outcome::Failure { cause } => Self::new(
                command,
                node,
                EventKind::Warning,
                format!("Failed on {node}: {cause}"),
            ),
            Outcome::Cancelled => Self::new(
                command,
                node,
                EventKind::Warning,
                format!("Dispatch to {node} cancelled before completion"),
            ),
        }
    }
}

/// Destination for command events.
pub trait EventSink: Send + Sync + 'static {
    fn record(&self, event: Event);
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: Event) {
        match event.kind {
            EventKind::Normal => tracing::info!(
                command = %event.command,
                node = %event.node,
                reason = %event.reason,
                message = %event.message,
                "Command event"
            ),
            EventKind::Warning => tracing::warn!(
                command = %event.command,
                node = %event.node,
                reason = %event.reason,
                message = %event.message,
                "Command event"
            ),
        }
    }
}

/// Keeps every event in memory, in recording order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events_for(&self, command: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.command == command)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
