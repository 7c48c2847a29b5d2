pub mod billing;
pub mod error;
pub mod gate;
pub mod plan;
pub mod ports;
pub mod repo;
pub mod service;
