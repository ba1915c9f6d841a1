use super::types::{
    EvaluateContext, EvaluateResponse, SetVariableResponse, Variable, VariablesArguments,
};
use thiserror::Error;

/// Failure of a single adapter request. The `Request` variant carries
/// the adapter's own message text, which is what gets surfaced inline
/// when an expansion or evaluation fails.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{command} request failed: {message}")]
    Request { command: String, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn request(command: &str, message: impl Into<String>) -> Self {
        ProtocolError::Request {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

/// Request surface this engine needs from the debug-adapter transport.
/// The transport is assumed reliable and ordered; calls block until
/// the matching response arrives.
pub trait ProtocolClient: Send + Sync {
    fn variables(&self, args: &VariablesArguments) -> Result<Vec<Variable>, ProtocolError>;

    fn evaluate(
        &self,
        expression: &str,
        context: EvaluateContext,
    ) -> Result<EvaluateResponse, ProtocolError>;

    fn set_variable(
        &self,
        variables_reference: u32,
        name: &str,
        value: &str,
    ) -> Result<SetVariableResponse, ProtocolError>;
}
