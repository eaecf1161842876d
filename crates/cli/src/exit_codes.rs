//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success, no line needs review                            |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args, unreadable input path)        |
//! | 3    | Review required (report written, at least one flag)      |
//! | 4    | Input could not be decoded                               |
//! | 5    | Input is missing a required column                       |
//! | 6    | Invalid configuration                                    |

use billcheck_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing or unreadable files.
pub const EXIT_USAGE: u8 = 2;

/// At least one billing line is `ReviewRequired`.
/// Suppressed by `--no-fail-on-review`.
pub const EXIT_REVIEW_REQUIRED: u8 = 3;

/// No supported encoding decodes an input file.
pub const EXIT_ENCODING: u8 = 4;

/// An input file lacks a required column.
pub const EXIT_SCHEMA: u8 = 5;

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Encoding { .. } => EXIT_ENCODING,
        ReconError::Schema { .. } | ReconError::Csv { .. } => EXIT_SCHEMA,
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
    }
}
