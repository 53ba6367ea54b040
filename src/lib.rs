pub mod api;
pub mod config;
pub mod db;
pub mod relay;
pub mod server;
pub mod store;

pub use self::config::Config;
