pub mod arm;
pub mod config;
pub mod http;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod state;
pub mod video;
