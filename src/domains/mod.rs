pub mod agent;
pub mod checkpoints;
pub mod git;
pub mod watch;
