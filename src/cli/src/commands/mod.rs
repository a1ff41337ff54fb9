pub mod config;
pub mod distribution;
pub mod health;
