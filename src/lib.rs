pub mod api_client;
pub mod args;
pub mod ingest;
pub mod runner;
