use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::agent::CommandRequest;
use crate::dispatch::{AgentConnector, DispatchReport, Outcome, RequestIdGenerator};
use crate::targets::DispatchTarget;

/// Fans a command out to every target concurrently.
pub struct Dispatcher<C: ?Sized> {
    connector: Arc<C>,
    request_ids: Arc<RequestIdGenerator>,
}

impl<C: ?Sized> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            request_ids: self.request_ids.clone(),
        }
    }
}

impl<C: AgentConnector + ?Sized> Dispatcher<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            request_ids: Arc::new(RequestIdGenerator::new()),
        }
    }

    /// Run `command` on every target and wait for all of them.
    ///
    /// Each target gets its own task and its own request id. Errors are
    /// recorded against the target that produced them and never abort the
    /// others. If `cancel` fires first, targets still in flight are reported
    /// as [`Outcome::Cancelled`]; their agent-side processes keep running.
    ///
    /// Node names in `targets` are expected to be unique.
    pub async fn dispatch(
        &self,
        command: &str,
        targets: &[DispatchTarget],
        cancel: &CancellationToken,
    ) -> DispatchReport {
        tracing::info!(targets = targets.len(), command, "Dispatching command");

        let mut tasks = JoinSet::new();
        for target in targets {
            let connector = self.connector.clone();
            let target = target.clone();
            let request = CommandRequest::new(self.request_ids.next_id(), command);

            tasks.spawn(async move {
                tracing::debug!(
                    node = %target.node_name,
                    address = %target.address,
                    request_id = %request.request_id,
                    "Sending command to agent"
                );
                let result = connector.execute(&target, request).await;
                (target.node_name, result)
            });
        }

        let mut outcomes = HashMap::with_capacity(targets.len());
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::warn!(
                        pending = tasks.len(),
                        "Dispatch cancelled, no longer waiting for pending targets"
                    );
                    tasks.abort_all();
                    break;
                }

                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((node, Ok(result)))) => {
                        tracing::info!(
                            node = %node,
                            request_id = %result.request_id,
                            exit_code = result.exit_code,
                            "Agent returned result"
                        );
                        outcomes.insert(node, Outcome::Success(result));
                    }
                    Some(Ok((node, Err(e)))) => {
                        tracing::warn!(node = %node, error = %e, "Dispatch to agent failed");
                        outcomes.insert(node, Outcome::Failure { cause: e.to_string() });
                    }
                    Some(Err(e)) => {
                        // The node name went down with the task; it is filled in below.
                        tracing::error!(error = %e, "Dispatch task terminated abnormally");
                    }
                },
            }
        }

        for target in targets {
            outcomes
                .entry(target.node_name.clone())
                .or_insert_with(|| {
                    if cancel.is_cancelled() {
                        Outcome::Cancelled
                    } else {
                        Outcome::Failure {
                            cause: "dispatch task terminated abnormally".to_string(),
                        }
                    }
                });
        }

        let report = DispatchReport { outcomes };
        tracing::info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            cancelled = report.cancelled_count(),
            "Dispatch finished"
        );
        report
    }
}
