pub mod config;
pub mod error;
pub mod ingest;
pub mod query;
pub mod server;
pub mod storage;
pub mod value;
