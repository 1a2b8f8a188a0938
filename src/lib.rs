pub mod config;
pub mod error;
pub mod message;
pub mod pacing;
pub mod protocol;
pub mod samples;
pub mod session;
pub mod supervisor;
pub mod workload;
