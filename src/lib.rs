pub mod api;
pub mod auth;
pub mod config;
pub mod llm;
pub mod models;
pub mod services;
pub mod state;
