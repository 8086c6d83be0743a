// Kagami image transformation proxy library

pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod router;
pub mod s3;
pub mod server;
pub mod source;
pub mod transform;
