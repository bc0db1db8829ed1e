use std::net::{IpAddr, SocketAddr};

use tonic::transport::{Channel, Endpoint};

use crate::agent::{CommandRequest, ExecutionResult};
use crate::config::{DispatchConfig, DispatchMode};
use crate::dispatch::AgentConnector;
use crate::error::{error_chain, JarvisError, Result};
use crate::grpc::convert::stream_request;
use crate::grpc::NODE_NAME_HEADER;
use crate::proto::agent_client::AgentClient;
use crate::targets::DispatchTarget;

/// Build the URI of an agent from a discovered address.
///
/// Addresses that already carry a port are used as-is; bare IPs and host
/// names get `port` appended.
pub fn agent_uri(address: &str, port: u16) -> String {
    if let Ok(sock) = address.parse::<SocketAddr>() {
        return format!("http://{sock}");
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return format!("http://{}", SocketAddr::new(ip, port));
    }
    format!("http://{address}:{port}")
}

/// Reaches agents over plaintext gRPC.
///
/// Every call opens a fresh connection that is dropped when the call ends;
/// nothing is pooled across dispatch rounds. No deadline is applied here.
#[derive(Debug, Clone, Default)]
pub struct GrpcAgentConnector {
    config: DispatchConfig,
}

impl GrpcAgentConnector {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    async fn connect(&self, address: &str) -> Result<AgentClient<Channel>> {
        let uri = agent_uri(address, self.config.agent_port());
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| JarvisError::Transport(format!("invalid agent endpoint {uri}: {e}")))?;

        let channel = endpoint.connect().await.map_err(|e| {
            JarvisError::Transport(format!("failed to connect to {uri}: {}", error_chain(&e)))
        })?;

        Ok(AgentClient::new(channel)
            .max_decoding_message_size(usize::MAX)
            .max_encoding_message_size(usize::MAX))
    }

    async fn run_unary(
        client: &mut AgentClient<Channel>,
        request: CommandRequest,
    ) -> Result<ExecutionResult> {
        let response = client.run_command(crate::proto::CommandRequest::from(request)).await?;
        let node_name = response
            .metadata()
            .get(NODE_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let mut result = ExecutionResult::from(response.into_inner());
        result.node_name = node_name;
        Ok(result)
    }

    /// Open a `Session` stream carrying a single command, half-close it and
    /// read until the agent answers that command.
    async fn run_streamed(
        client: &mut AgentClient<Channel>,
        request: CommandRequest,
    ) -> Result<ExecutionResult> {
        let request_id = request.request_id.clone();
        let outbound = tokio_stream::iter(vec![stream_request(request)]);
        let mut inbound = client.session(outbound).await?.into_inner();

        while let Some(response) = inbound.message().await? {
            let Some(result) = response.result else {
                continue;
            };
            if result.id == request_id {
                tracing::debug!(
                    request_id = %request_id,
                    node_name = %response.node_name,
                    "Stream response received"
                );
                let mut result = ExecutionResult::from(result);
                if !response.node_name.is_empty() {
                    result.node_name = Some(response.node_name);
                }
                return Ok(result);
            }
        }

        Err(JarvisError::Transport(format!(
            "agent closed the stream without answering {request_id}"
        )))
    }
}

#[tonic::async_trait]
impl AgentConnector for GrpcAgentConnector {
    async fn execute(
        &self,
        target: &DispatchTarget,
        request: CommandRequest,
    ) -> Result<ExecutionResult> {
        let mut client = self.connect(&target.address).await?;
        match self.config.mode {
            DispatchMode::Unary => Self::run_unary(&mut client, request).await,
            DispatchMode::Stream => Self::run_streamed(&mut client, request).await,
        }
    }
}
