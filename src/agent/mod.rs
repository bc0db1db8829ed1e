//! Per-node agent that runs shell commands for the controller.
//!
//! - [`CommandExecutor`]: runs a command through the configured shell,
//!   optionally inside a different filesystem root, and captures combined
//!   output plus exit status
//! - [`identity`]: resolves the node name the agent reports
//!
//! The gRPC surface lives in [`crate::grpc::agent_service`].
//!
//! # Security Note
//!
//! Commands run with the agent's privileges and the transport is plaintext.
//! Both are expected to be constrained by the deployment.

pub mod executor;
pub mod identity;

pub use executor::{CommandExecutor, CommandRequest, ExecutionResult};
pub use identity::resolve_node_name;
