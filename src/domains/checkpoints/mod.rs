pub mod entity;
pub mod ids;
pub mod service;
