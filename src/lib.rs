pub mod bridge;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ids;
pub mod mime;
pub mod negative_cache;
pub mod path;
pub mod race;
pub mod server;
pub mod store;
