//! CLI 错误

use std::path::PathBuf;

use b9_core::{DeserializeError, VerifyError, VmError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("failed to open log file '{}': {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to load module: {0}")]
    Deserialize(#[from] DeserializeError),

    #[error("Bytecode verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("{}", vm_message(.0))]
    Vm(#[from] VmError),
}

/// 与 b9run 相同的措辞
fn vm_message(e: &VmError) -> String {
    match e {
        VmError::Deserialize(inner) => format!("Failed to load module: {}", inner),
        VmError::Load(inner) => format!("Failed to load module: {}", inner),
        VmError::FunctionNotFound(name) => format!("Failed to find function: {}", name),
        VmError::BadFunctionCall { .. } => format!("Failed to call function {}", e),
        other => format!("Error: {}", other),
    }
}
