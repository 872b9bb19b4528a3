// Business logic services and outbound API clients

pub mod account_service;
pub mod admin_service;
pub mod auth_admin_client;
pub mod background_job_service;
pub mod billing_service;
pub mod chat_service;
pub mod coach_prompts;
pub mod email_service;
pub mod exercise_api_client;
pub mod exercise_image_service;
pub mod profile_service;
pub mod program_service;
pub mod role_service;
pub mod session_service;
pub mod stats_service;
pub mod stripe_client;
pub mod subscription_service;

pub use account_service::AccountService;
pub use admin_service::AdminService;
pub use auth_admin_client::AuthAdminClient;
pub use background_job_service::BackgroundJobService;
pub use billing_service::BillingService;
pub use chat_service::ChatService;
pub use email_service::EmailService;
pub use exercise_api_client::ExerciseApiClient;
pub use exercise_image_service::ExerciseImageService;
pub use profile_service::{CoachingContext, ProfileService};
pub use program_service::{ProgramService, WeekPlanner};
pub use role_service::RoleService;
pub use session_service::SessionService;
pub use stats_service::StatsService;
pub use stripe_client::StripeClient;
pub use subscription_service::SubscriptionService;
