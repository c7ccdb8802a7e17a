//! Error type for the processor pipeline (spec §4.H).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("processor worker task panicked: {0}")]
    TaskJoin(String),

    #[error("warehouse operation failed: {0}")]
    Warehouse(String),

    #[error("object store upload failed: {0}")]
    Upload(String),

    #[error("no processor script registered for {0}")]
    MissingScript(String),

    #[error("processor for {table} exited non-zero: {output}")]
    NonZeroExit { table: String, output: String },
}
