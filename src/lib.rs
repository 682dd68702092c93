pub mod auth;
pub mod cache_utils;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod http;
pub mod llm;
pub mod models;
pub mod persona;
pub mod rate_limit;
pub mod redis_store;
pub mod types;
