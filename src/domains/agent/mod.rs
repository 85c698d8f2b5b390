pub mod executor;
pub mod notes;
pub mod protocol;
pub mod queue;
