pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod location;
pub mod media;
pub mod models;
pub mod observability;
pub mod realtime;
pub mod session;
pub mod state;
pub mod storage;
