//! Node targeting: which nodes receive a command, and where their agents live.
//!
//! - [`selector`]: label-based node selection (`In`, `NotIn`, `Exists`, `DoesNotExist`)
//! - [`discovery`]: node inventory records and agent endpoint records
//! - [`resolver`]: joins the two into concrete dispatch targets
//!
//! Nothing in this module performs I/O.

pub mod discovery;
pub mod resolver;
pub mod selector;

pub use discovery::{agent_addresses, EndpointRecord, NodeRecord};
pub use resolver::{resolve, DispatchTarget, Resolution};
pub use selector::{
    matches, CompiledSelector, ConfigError, MatchExpression, NodeSelector, Operator, SelectorTerm,
};
