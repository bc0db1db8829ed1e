use crate::agent::{CommandRequest, ExecutionResult};
use crate::proto;

impl From<proto::CommandRequest> for CommandRequest {
    fn from(req: proto::CommandRequest) -> Self {
        Self {
            request_id: req.id,
            command: req.cmd,
        }
    }
}

impl From<CommandRequest> for proto::CommandRequest {
    fn from(req: CommandRequest) -> Self {
        Self {
            id: req.request_id,
            cmd: req.command,
        }
    }
}

impl From<proto::CommandResult> for ExecutionResult {
    fn from(result: proto::CommandResult) -> Self {
        Self {
            request_id: result.id,
            output: result.output,
            exit_code: result.exit_code,
            node_name: None,
        }
    }
}

impl From<ExecutionResult> for proto::CommandResult {
    fn from(result: ExecutionResult) -> Self {
        Self {
            id: result.request_id,
            output: result.output,
            exit_code: result.exit_code,
        }
    }
}

/// Wrap a command in the envelope used on the `Session` stream.
pub fn stream_request(request: CommandRequest) -> proto::StreamRequest {
    proto::StreamRequest {
        payload: Some(proto::stream_request::Payload::Command(request.into())),
    }
}
