pub mod cli;
pub mod commands;
pub mod domains;
pub mod errors;
pub mod infrastructure;
pub mod shared;
