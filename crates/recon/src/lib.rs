//! `billcheck-recon`: monthly billing vs. CRM reconciliation engine.
//!
//! Pure engine crate: receives raw export bytes, returns classified results.
//! No CLI or IO dependencies.

pub mod classify;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod parse;
pub mod product;
pub mod repair;
pub mod report;

pub use config::ReconConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{Diagnostic, ReconInput, ReconResult, ReconciliationResult, SourceFile, Verdict};
