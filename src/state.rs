use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{JwtService, RateLimiter};
use crate::config::{AppConfig, IntegrationsConfig};
use crate::llm::{LlmGateway, LlmProvider};
use crate::services::{
    AccountService, AdminService, AuthAdminClient, BillingService, ChatService, EmailService,
    ExerciseApiClient, ExerciseImageService, ProgramService, StripeClient,
};

/// Requests per minute allowed on the LLM-backed endpoints, per user
const LLM_REQUESTS_PER_MINUTE: usize = 20;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub llm: Arc<dyn LlmProvider>,
    pub stripe: StripeClient,
    pub email: EmailService,
    pub auth_admin: AuthAdminClient,
    pub exercises: ExerciseApiClient,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(db: PgPool, config: AppConfig, integrations: &IntegrationsConfig) -> Result<Self> {
        let llm = LlmGateway::new(&integrations.llm)?;
        Self::with_llm(db, config, integrations, Arc::new(llm))
    }

    /// Same as [`AppState::new`] with a caller-provided LLM backend
    pub fn with_llm(
        db: PgPool,
        config: AppConfig,
        integrations: &IntegrationsConfig,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        Ok(Self {
            db,
            jwt: JwtService::new(&config.auth_jwt_secret),
            config: Arc::new(config),
            llm,
            stripe: StripeClient::new(&integrations.stripe)?,
            email: EmailService::new(&integrations.email)?,
            auth_admin: AuthAdminClient::new(&integrations.auth_admin)?,
            exercises: ExerciseApiClient::new(&integrations.exercises)?,
            rate_limiter: RateLimiter::new(LLM_REQUESTS_PER_MINUTE, Duration::from_secs(60)),
        })
    }

    pub fn free_uses(&self) -> i32 {
        self.config.free_coach_uses
    }

    pub fn chat_service(&self) -> ChatService {
        ChatService::new(self.db.clone(), self.free_uses())
    }

    pub fn program_service(&self) -> ProgramService {
        ProgramService::new(self.db.clone(), self.llm.clone(), self.free_uses())
    }

    pub fn billing_service(&self) -> BillingService {
        BillingService::new(
            self.db.clone(),
            self.stripe.clone(),
            self.email.clone(),
            self.config.app_url.clone(),
            self.free_uses(),
        )
    }

    pub fn account_service(&self) -> AccountService {
        AccountService::new(
            self.db.clone(),
            self.stripe.clone(),
            self.auth_admin.clone(),
            self.email.clone(),
        )
    }

    pub fn admin_service(&self) -> AdminService {
        AdminService::new(
            self.db.clone(),
            self.auth_admin.clone(),
            self.email.clone(),
            self.stripe.clone(),
            self.config.app_url.clone(),
        )
    }

    pub fn exercise_image_service(&self) -> ExerciseImageService {
        ExerciseImageService::new(self.db.clone(), self.exercises.clone())
    }
}
