//! Reconciliation driver: turns "command changed" notifications into
//! dispatch rounds and reports every per-node outcome as an event.
//!
//! # Flow
//!
//! 1. A [`Trigger`] arrives (a command changed, or the agent endpoints did)
//! 2. The command, the node inventory and the agent endpoints are read from
//!    [`ClusterState`]
//! 3. Targets are resolved; selected nodes without an agent get a warning
//! 4. A [`DispatchJob`] fans the command out and records one event per target
//!
//! Rounds are never debounced: every trigger re-resolves and re-dispatches.

pub mod events;
pub mod inventory;
pub mod reconciler;

pub use events::{Event, EventKind, EventSink, MemoryEventSink, TracingEventSink};
pub use inventory::{ClusterState, CommandResource, CommandSpec, Inventory, StaticCluster};
pub use reconciler::{CommandReconciler, DispatchJob, Trigger};
