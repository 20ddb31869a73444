use thiserror::Error;

use prophet_core::{ModelLoadError, PipelineError, StoreError};

use crate::config::ConfigError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("store open failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Run(#[from] PipelineError),
}

impl CliError {
    /// 0 success, 1 run failure (including zero predictions), 2 config or
    /// validation error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::ModelLoad(_) | Self::Store(_) => 2,
            Self::Run(_) => 1,
        }
    }
}
