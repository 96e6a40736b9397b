//! Advisory warnings surfaced before a reindex is created.

use serde::{Deserialize, Serialize};

/// Closed set of advisory warnings produced by inspecting a source index.
///
/// Warnings never block operation creation; they tell the caller what the
/// migration will change about the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReindexWarning {
    /// The mapping enables the removed `_all` meta field, which will be
    /// dropped from the destination index.
    AllField,

    /// The mapping contains boolean fields; loosely-typed values such as
    /// `"yes"` or `1` will be coerced to real booleans during the copy.
    BooleanFields,

    /// The index matches the legacy APM index pattern and its mapping
    /// predates the current APM schema.
    ApmReindex,
}

impl std::fmt::Display for ReindexWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReindexWarning::AllField => write!(f, "allField"),
            ReindexWarning::BooleanFields => write!(f, "booleanFields"),
            ReindexWarning::ApmReindex => write!(f, "apmReindex"),
        }
    }
}
