use std::fmt;

/// Domain errors callers branch on. Everything else flows through
/// `anyhow::Error` with context at the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemError {
    NotInitialized {
        path: String,
    },
    SchemaMismatch {
        found: String,
        expected: String,
    },
    BranchNotFound {
        branch_id: String,
    },
    LeafNotFound {
        target: String,
    },
    /// A bare jump target matched leaves on more than one branch.
    AmbiguousLeaf {
        leaf_id: String,
        branches: Vec<String>,
    },
    NoCurrentBranch,
}

impl fmt::Display for StemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotInitialized { path } => {
                write!(
                    f,
                    "Not a stem repository at '{path}' (run 'stem create' first)"
                )
            }
            Self::SchemaMismatch { found, expected } => {
                write!(
                    f,
                    "Stem database schema version '{found}' does not match '{expected}' (refusing to migrate)"
                )
            }
            Self::BranchNotFound { branch_id } => {
                write!(f, "Branch '{branch_id}' not found")
            }
            Self::LeafNotFound { target } => {
                write!(f, "No leaf or branch matches '{target}'")
            }
            Self::AmbiguousLeaf { leaf_id, branches } => {
                write!(
                    f,
                    "Leaf '{leaf_id}' exists on multiple branches ({}); qualify with a branch id",
                    branches.join(", ")
                )
            }
            Self::NoCurrentBranch => {
                write!(
                    f,
                    "No current branch is set (create one with 'stem branch')"
                )
            }
        }
    }
}

impl std::error::Error for StemError {}
