//! gRPC surface of the agent and the controller's client for it.
//!
//! - [`agent_service`]: `RunCommand` and `Session` implementations
//! - [`server`]: hosts the agent service
//! - [`client`]: [`GrpcAgentConnector`], used by the dispatch coordinator
//! - [`convert`]: mapping between wire messages and domain types

pub mod agent_service;
pub mod client;
pub mod convert;
pub mod server;

pub use agent_service::AgentServiceImpl;
pub use client::{agent_uri, GrpcAgentConnector};
pub use server::AgentServer;

/// Response metadata key under which the agent names itself on unary calls.
pub const NODE_NAME_HEADER: &str = "x-jarvis-node";
