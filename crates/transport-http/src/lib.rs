// HTTP transport for remote media sources

pub mod client;
pub mod config;
pub mod source;

pub use client::{probe, RemoteInfo};
pub use config::HttpConfig;
pub use source::HttpSource;
