use thiserror::Error;

use crate::model::RecordKind;

/// Fatal errors. Anything that can be isolated to a single row is reported as a
/// [`crate::model::Diagnostic`] instead.
#[derive(Debug, Error)]
pub enum ReconError {
    /// No supported encoding decodes the input within the corruption tolerance.
    #[error("{source_name}: cannot decode input: {detail}")]
    Encoding { source_name: String, detail: String },

    /// A required logical column has no matching header.
    #[error(
        "{source_name}: {kind} file is missing required column '{column}' (found: {})",
        available.join(", ")
    )]
    Schema {
        source_name: String,
        kind: RecordKind,
        column: String,
        available: Vec<String>,
    },

    /// The delimited reader could not produce a header row.
    #[error("{source_name}: cannot read CSV header: {message}")]
    Csv { source_name: String, message: String },

    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (empty status list, bad ratio, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
}
