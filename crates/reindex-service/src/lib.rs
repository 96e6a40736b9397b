//! # reindex-service
//!
//! Stateless business logic for the reindex orchestrator.
//!
//! Provides:
//! - [`ReindexService`]: operation lifecycle (create, find, pause, resume)
//!   and the step machine driven by `process_next_step`
//! - Warning detection over source-index settings and mappings
//! - Settings/mappings transformation for the destination index
//! - The boolean-coercion script embedded in reindex requests

mod error;
mod script;
mod service;
mod transform;
mod warnings;

pub use error::{error_chain, ErrorKind, ReindexError};
pub use script::{boolean_coercion_script, boolean_field_paths, BOOLEAN_COERCION_SCRIPT};
pub use service::{is_ml_index, ReindexService};
pub use transform::{new_index_body, transform_flat_settings, transform_mappings};
pub use warnings::detect_warnings;
