// Library for tests to access modules

pub mod aggregator;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod input;
pub mod models;
pub mod store;
pub mod transform;
pub mod zeek_reader;
