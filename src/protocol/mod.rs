mod client;
mod types;

pub use client::{ProtocolClient, ProtocolError};
pub use types::{
    EvaluateContext, EvaluateResponse, OutputCategory, OutputEvent, SetVariableResponse, Source,
    Variable, VariablesArguments, VariablesFilter,
};
