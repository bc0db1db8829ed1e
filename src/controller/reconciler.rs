use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::controller::events::{Event, EventSink};
use crate::controller::inventory::{ClusterState, CommandResource};
use crate::dispatch::{AgentConnector, DispatchReport, Dispatcher};
use crate::error::{JarvisError, Result};
use crate::targets::{agent_addresses, resolve, DispatchTarget};

/// Why a reconciliation round should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A command resource was created or changed.
    Command { command_id: String },
    /// The agent service's endpoint records changed; every command is
    /// reconciled again.
    AgentEndpointsChanged,
}

impl Trigger {
    pub fn command(command_id: impl Into<String>) -> Self {
        Trigger::Command {
            command_id: command_id.into(),
        }
    }
}

/// Handle to one in-flight dispatch round.
#[derive(Debug)]
pub struct DispatchJob {
    round_id: Uuid,
    command_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<DispatchReport>,
}

impl DispatchJob {
    pub fn round_id(&self) -> Uuid {
        self.round_id
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    /// Stop waiting for targets that have not answered yet. They are
    /// reported as cancelled; processes already started on agents keep
    /// running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this round, for callers that hand the job off.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the round to finish and return its report.
    pub async fn wait(self) -> Result<DispatchReport> {
        self.handle.await.map_err(|e| {
            JarvisError::Internal(format!("dispatch round {} failed: {e}", self.round_id))
        })
    }
}

/// Runs dispatch rounds for command resources.
pub struct CommandReconciler {
    cluster: Arc<dyn ClusterState>,
    dispatcher: Dispatcher<dyn AgentConnector>,
    events: Arc<dyn EventSink>,
}

impl CommandReconciler {
    pub fn new(
        cluster: Arc<dyn ClusterState>,
        connector: Arc<dyn AgentConnector>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cluster,
            dispatcher: Dispatcher::new(connector),
            events,
        }
    }

    /// Handle one trigger, returning the rounds it started.
    ///
    /// A selector error aborts the round of that command only; with
    /// [`Trigger::AgentEndpointsChanged`] the remaining commands still run.
    pub async fn reconcile(&self, trigger: Trigger) -> Result<Vec<DispatchJob>> {
        match trigger {
            Trigger::Command { command_id } => {
                Ok(self.reconcile_command(&command_id).await?.into_iter().collect())
            }
            Trigger::AgentEndpointsChanged => {
                let commands = self.cluster.list_commands().await?;
                tracing::info!(
                    commands = commands.len(),
                    "Agent endpoints changed, reconciling all commands"
                );

                let mut jobs = Vec::with_capacity(commands.len());
                for command in commands {
                    match self.reconcile_resource(command).await {
                        Ok(job) => jobs.push(job),
                        Err(e) => tracing::error!(error = %e, "Reconciliation failed"),
                    }
                }
                Ok(jobs)
            }
        }
    }

    /// Reconcile a single command. Returns `None` when the command no longer
    /// exists.
    pub async fn reconcile_command(&self, command_id: &str) -> Result<Option<DispatchJob>> {
        let Some(command) = self.cluster.get_command(command_id).await? else {
            tracing::debug!(command = %command_id, "Command not found, nothing to do");
            return Ok(None);
        };
        self.reconcile_resource(command).await.map(Some)
    }

    async fn reconcile_resource(&self, command: CommandResource) -> Result<DispatchJob> {
        tracing::info!(command = %command.name, "Reconciling command");

        let nodes = self.cluster.list_nodes().await?;
        let endpoints = self.cluster.list_agent_endpoints().await?;
        let addresses = agent_addresses(&endpoints);

        let resolution = resolve(&nodes, &command.spec.selector, &addresses).map_err(|e| {
            tracing::error!(command = %command.name, error = %e, "Rejecting command");
            JarvisError::from(e)
        })?;

        for node in &resolution.unreachable {
            self.events
                .record(Event::agent_unavailable(&command.name, node));
        }

        Ok(self.start_job(command, resolution.targets))
    }

    fn start_job(&self, command: CommandResource, targets: Vec<DispatchTarget>) -> DispatchJob {
        let round_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let span = tracing::info_span!(
            "dispatch_round",
            round = %round_id,
            command = %command.name
        );

        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        let token = cancel.clone();
        let command_id = command.name.clone();

        let handle = tokio::spawn(
            async move {
                let report = dispatcher
                    .dispatch(&command.spec.command, &targets, &token)
                    .await;

                for target in &targets {
                    if let Some(outcome) = report.get(&target.node_name) {
                        events.record(Event::from_outcome(
                            &command.name,
                            &command.spec.command,
                            &target.node_name,
                            outcome,
                        ));
                    }
                }
                report
            }
            .instrument(span),
        );

        DispatchJob {
            round_id,
            command_id,
            cancel,
            handle,
        }
    }

    /// Consume triggers until `shutdown` fires or the channel closes.
    ///
    /// On shutdown every in-flight round is cancelled. When the channel
    /// closes, in-flight rounds are allowed to finish.
    pub async fn run(&self, mut triggers: mpsc::Receiver<Trigger>, shutdown: CancellationToken) {
        let mut jobs: Vec<DispatchJob> = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(in_flight = jobs.len(), "Reconciler shutting down");
                    break;
                }
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => {
                        jobs.retain(|job| !job.is_finished());
                        match self.reconcile(trigger).await {
                            Ok(started) => jobs.extend(started),
                            Err(e) => tracing::error!(error = %e, "Reconciliation failed"),
                        }
                    }
                    None => {
                        tracing::info!("Trigger channel closed");
                        break;
                    }
                },
            }
        }

        if shutdown.is_cancelled() {
            for job in &jobs {
                job.cancel();
            }
        }
        for job in jobs {
            let command_id = job.command_id().to_string();
            if let Err(e) = job.wait().await {
                tracing::warn!(command = %command_id, error = %e, "Dispatch round ended abnormally");
            }
        }
    }
}
