pub mod connection;
pub mod db_branches;
pub mod db_exec_ledger;
pub mod db_jumps;
pub mod db_leaves;
pub mod db_meta;
pub mod db_schema;
pub mod timestamps;

pub use connection::Database;
pub use db_branches::BranchMethods;
pub use db_exec_ledger::ExecLedgerMethods;
pub use db_jumps::JumpMethods;
pub use db_leaves::LeafMethods;
pub use db_meta::MetaMethods;
pub use db_schema::{initialize_schema, verify_schema};
