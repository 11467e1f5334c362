pub mod auth;
pub mod config;
pub mod db;
pub mod views;

pub use self::config::Config;
