pub mod budget;
pub mod candidate;
pub mod catalog;
pub mod competitors;
pub mod concurrency;
pub mod config;
pub mod embedding;
pub mod engine_config;
pub mod errors;
pub mod gates;
pub mod invoker;
pub mod logging;
pub mod orchestrator;
pub mod publish;
pub mod report;
pub mod scoring;
pub mod search;
pub mod shell;
pub mod signals;
pub mod util;
