use anyhow::Result;
use std::env;

/// Settings for the OpenAI-compatible LLM gateway
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Stripe billing settings
#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
}

/// Transactional email HTTP API settings
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub api_key: String,
    pub from_address: String,
}

/// Public exercise database settings
#[derive(Debug, Clone)]
pub struct ExerciseApiSettings {
    pub base_url: String,
    pub api_key: String,
}

/// Admin API of the managed auth provider
#[derive(Debug, Clone)]
pub struct AuthAdminSettings {
    pub base_url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct IntegrationsConfig {
    pub llm: LlmSettings,
    pub stripe: StripeSettings,
    pub email: EmailSettings,
    pub exercises: ExerciseApiSettings,
    pub auth_admin: AuthAdminSettings,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl IntegrationsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            llm: LlmSettings {
                base_url: var_or("LLM_GATEWAY_URL", "https://ai.gateway.example.com/v1"),
                api_key: var_or("LLM_GATEWAY_API_KEY", ""),
                model: var_or("LLM_MODEL", "google/gemini-2.5-flash"),
            },
            stripe: StripeSettings {
                api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
                secret_key: var_or("STRIPE_SECRET_KEY", ""),
                webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
                price_id: var_or("STRIPE_PRICE_ID", ""),
            },
            email: EmailSettings {
                base_url: var_or("EMAIL_API_URL", "https://api.resend.com"),
                api_key: var_or("EMAIL_API_KEY", ""),
                from_address: var_or("EMAIL_FROM", "Coach <noreply@example.com>"),
            },
            exercises: ExerciseApiSettings {
                base_url: var_or("EXERCISE_API_URL", "https://exercisedb.p.rapidapi.com"),
                api_key: var_or("EXERCISE_API_KEY", ""),
            },
            auth_admin: AuthAdminSettings {
                base_url: var_or("AUTH_ADMIN_URL", "http://localhost:54321/auth/v1"),
                service_key: var_or("AUTH_SERVICE_ROLE_KEY", ""),
            },
        })
    }
}
