mod config;
pub use config::CouchConfig;

mod client;
pub use client::CouchStore;
