// API routes and handlers

pub mod account;
pub mod admin;
pub mod billing;
pub mod chat;
pub mod error;
pub mod exercises;
pub mod health;
pub mod profile;
pub mod programs;
pub mod routes;
pub mod sessions;

pub use error::ApiError;
pub use routes::create_routes;
