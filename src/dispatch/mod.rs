//! Concurrent fan-out of one command to many agents.
//!
//! The [`Dispatcher`] issues one independent call per [`DispatchTarget`]
//! and reports exactly one [`Outcome`] per target. A failing target never
//! cancels or delays its siblings. The coordinator adds no retry, timeout
//! or backoff; the caller's cancellation token is the only way to stop
//! waiting early.
//!
//! How a call reaches an agent is abstracted by [`AgentConnector`]; the
//! production implementation is [`crate::grpc::GrpcAgentConnector`].

pub mod coordinator;
pub mod request_id;

use std::collections::HashMap;

use crate::agent::{CommandRequest, ExecutionResult};
use crate::error::Result;
use crate::targets::DispatchTarget;

pub use coordinator::Dispatcher;
pub use request_id::RequestIdGenerator;

/// Carries one command to the agent behind a target.
///
/// An `Err` is a transport or protocol failure for that target only. A
/// command that ran and exited nonzero is an `Ok` result.
#[tonic::async_trait]
pub trait AgentConnector: Send + Sync + 'static {
    async fn execute(
        &self,
        target: &DispatchTarget,
        request: CommandRequest,
    ) -> Result<ExecutionResult>;
}

/// What happened to one target in a dispatch round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The agent ran the command; the exit code may still be nonzero.
    Success(ExecutionResult),
    /// The command could not be delivered or its result not received.
    Failure { cause: String },
    /// The round was cancelled before this target reported back.
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Per-target outcomes of one dispatch round, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: HashMap<String, Outcome>,
}

impl DispatchReport {
    pub fn get(&self, node_name: &str) -> Option<&Outcome> {
        self.outcomes.get(node_name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Failure { .. }))
            .count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Cancelled))
            .count()
    }
}
