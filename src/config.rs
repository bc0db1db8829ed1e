use std::net::SocketAddr;
use std::path::PathBuf;

/// Well-known port every agent listens on.
pub const DEFAULT_AGENT_PORT: u16 = 50051;

/// How commands are executed on the agent's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Shell interpreter that receives the command text via `-c`.
    pub shell: String,
    /// When set, the shell runs inside this filesystem root (`chroot`)
    /// instead of the agent's own root. Typically the host filesystem
    /// mounted into the agent container, e.g. `/host`.
    pub execution_root: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            execution_root: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_execution_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.execution_root = Some(root.into());
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

/// Configuration of a single per-node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub listen_addr: SocketAddr,
    /// Identity reported on streaming responses. Resolved once at startup.
    pub node_name: String,
    pub execution: ExecutionConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_AGENT_PORT)),
            node_name: "localhost".to_string(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(listen_addr: SocketAddr, node_name: impl Into<String>) -> Self {
        Self {
            listen_addr,
            node_name: node_name.into(),
            ..Default::default()
        }
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }
}

/// Which agent RPC carries a dispatched command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// `RunCommand`, one request and one response.
    #[default]
    Unary,
    /// `Session`, opened for a single command and half-closed right after it.
    Stream,
}

/// Controller-side settings for reaching agents.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Port appended to discovered agent addresses that do not carry one.
    /// `None` means [`DEFAULT_AGENT_PORT`].
    pub agent_port: Option<u16>,
    pub mode: DispatchMode,
}

impl DispatchConfig {
    pub fn agent_port(&self) -> u16 {
        self.agent_port.unwrap_or(DEFAULT_AGENT_PORT)
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }
}
