pub mod codec;
pub mod compare;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod fingerprint;
pub mod mode;
pub mod model;
pub mod parser;
pub mod providers;
pub mod scoring;
pub mod submission;

pub mod report;
