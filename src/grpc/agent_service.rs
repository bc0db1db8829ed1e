use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::MetadataValue;
use tonic::{Request, Response, Status, Streaming};

use crate::agent::{CommandExecutor, CommandRequest};
use crate::proto::agent_server::Agent;
use crate::proto::stream_request::Payload;
use crate::grpc::NODE_NAME_HEADER;
use crate::proto::{CommandResult, StreamRequest, StreamResponse};

/// gRPC service that executes commands on the local node.
///
/// Both entry points share one executor. The node name is fixed at
/// construction and attached to every response: as a field on the stream,
/// as [`NODE_NAME_HEADER`] metadata on unary calls.
#[derive(Debug, Clone)]
pub struct AgentServiceImpl {
    executor: CommandExecutor,
    node_name: Arc<str>,
}

impl AgentServiceImpl {
    pub fn new(executor: CommandExecutor, node_name: impl Into<Arc<str>>) -> Self {
        Self {
            executor,
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }
}

type ResponseStream =
    Pin<Box<dyn tokio_stream::Stream<Item = Result<StreamResponse, Status>> + Send>>;

#[tonic::async_trait]
impl Agent for AgentServiceImpl {
    type SessionStream = ResponseStream;

    async fn run_command(
        &self,
        request: Request<crate::proto::CommandRequest>,
    ) -> Result<Response<CommandResult>, Status> {
        let req = CommandRequest::from(request.into_inner());
        tracing::debug!(request_id = %req.request_id, "Unary command received");

        let result = self.executor.execute(&req).await;
        let mut response = Response::new(result.into());
        match MetadataValue::try_from(self.node_name.as_ref()) {
            Ok(value) => {
                response.metadata_mut().insert(NODE_NAME_HEADER, value);
            }
            Err(_) => tracing::debug!(
                node_name = %self.node_name,
                "Node name is not a valid header value"
            ),
        }
        Ok(response)
    }

    async fn session(
        &self,
        request: Request<Streaming<StreamRequest>>,
    ) -> Result<Response<Self::SessionStream>, Status> {
        let mut inbound = request.into_inner();
        let executor = self.executor.clone();
        let node_name = self.node_name.clone();

        // Capacity 1: the next request is not read until the previous
        // response has been handed to the transport.
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        tokio::spawn(async move {
            tracing::info!("Agent stream opened");
            loop {
                let frame = match inbound.message().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        tracing::info!("Agent stream closed by initiator");
                        break;
                    }
                    Err(status) => {
                        tracing::warn!(error = %status, "Error receiving from agent stream");
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                };

                let Some(Payload::Command(command)) = frame.payload else {
                    tracing::debug!("Ignoring stream frame without a command");
                    continue;
                };

                let req = CommandRequest::from(command);
                let result = executor.execute(&req).await;
                let response = StreamResponse {
                    node_name: node_name.to_string(),
                    result: Some(result.into()),
                };

                if tx.send(Ok(response)).await.is_err() {
                    tracing::info!(request_id = %req.request_id, "Stream initiator went away");
                    break;
                }
            }
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::SessionStream))
    }
}
