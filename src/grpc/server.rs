use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::agent::CommandExecutor;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::grpc::AgentServiceImpl;
use crate::proto::agent_server::AgentServer as AgentGrpcServer;

/// Hosts the agent service on one address.
///
/// Plaintext only: securing the channel is left to the deployment.
pub struct AgentServer {
    config: AgentConfig,
}

impl AgentServer {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    fn service(&self) -> AgentGrpcServer<AgentServiceImpl> {
        let executor = CommandExecutor::new(self.config.execution.clone());
        // Command output is not capped, so neither are messages.
        AgentGrpcServer::new(AgentServiceImpl::new(executor, self.config.node_name.as_str()))
            .max_decoding_message_size(usize::MAX)
            .max_encoding_message_size(usize::MAX)
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        tracing::info!(
            addr = ?local_addr,
            node_name = %self.config.node_name,
            execution_root = ?self.config.execution.execution_root,
            "Starting agent gRPC server"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                shutdown.cancelled_owned(),
            )
            .await?;

        tracing::info!("Agent gRPC server stopped");
        Ok(())
    }
}
