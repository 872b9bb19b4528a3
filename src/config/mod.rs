// Runtime configuration, read from the environment

pub mod app;
pub mod database;
pub mod integrations;

pub use app::AppConfig;
pub use database::DatabaseConfig;
pub use integrations::{
    AuthAdminSettings, EmailSettings, ExerciseApiSettings, IntegrationsConfig, LlmSettings,
    StripeSettings,
};
