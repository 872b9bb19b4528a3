// Weekly planner against a scripted LLM provider

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fitcoach::api::ApiError;
use fitcoach::llm::{ChatRequest, ChatResponse, ChatStream, LlmError, LlmProvider};
use fitcoach::models::{Goal, TrainingPreferences};
use fitcoach::services::{CoachingContext, WeekPlanner};

mock! {
    pub Llm {}

    #[async_trait]
    impl LlmProvider for Llm {
        fn default_model(&self) -> String;
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
        async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError>;
    }
}

fn week_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn preferences(sessions_per_week: i32) -> TrainingPreferences {
    TrainingPreferences {
        user_id: Uuid::new_v4(),
        sessions_per_week,
        session_minutes: 45,
        preferred_days: vec!["monday".to_string(), "wednesday".to_string(), "friday".to_string()],
        equipment: vec!["haltères".to_string()],
        location: "home".to_string(),
        level: "beginner".to_string(),
        dietary_restrictions: vec![],
        updated_at: Utc::now(),
    }
}

fn context() -> CoachingContext {
    CoachingContext {
        goal: Some(Goal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            goal_type: "muscle_gain".to_string(),
            target_weight_kg: None,
            target_date: None,
            description: None,
            is_active: true,
            created_at: Utc::now(),
        }),
        ..Default::default()
    }
}

fn plan_reply(title: &str) -> Result<ChatResponse, LlmError> {
    Ok(ChatResponse {
        content: format!(
            r#"{{"title": "{}", "exercises": [{{"name": "Pompes", "sets": 3, "reps": "10-12", "rest_seconds": 60}}]}}"#,
            title
        ),
        model: "test-model".to_string(),
        finish_reason: Some("stop".to_string()),
    })
}

fn garbage_reply() -> Result<ChatResponse, LlmError> {
    Ok(ChatResponse {
        content: "Désolé, je ne peux pas.".to_string(),
        model: "test-model".to_string(),
        finish_reason: Some("stop".to_string()),
    })
}

fn planner(llm: MockLlm) -> WeekPlanner {
    WeekPlanner::new(Arc::new(llm)).with_backoff(Duration::ZERO)
}

#[tokio::test]
async fn test_one_call_per_session_in_json_mode() {
    let mut llm = MockLlm::new();
    llm.expect_complete()
        .withf(|request| request.json_mode)
        .times(3)
        .returning(|_| plan_reply("Haut du corps"));

    let planned = planner(llm)
        .plan_week(&context(), &preferences(3), week_start())
        .await
        .unwrap();

    assert_eq!(planned.len(), 3);
    let dates: Vec<NaiveDate> = planned.iter().map(|p| p.slot.date).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
        ]
    );
    assert_eq!(planned[0].slot.focus, "haut du corps - poussée");
}

#[tokio::test]
async fn test_failed_session_is_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut llm = MockLlm::new();
    llm.expect_complete().times(3).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            1 => garbage_reply(),
            n => plan_reply(&format!("Séance {}", n + 1)),
        }
    });

    let planned = planner(llm)
        .plan_week(&context(), &preferences(3), week_start())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let indices: Vec<usize> = planned.iter().map(|p| p.slot.index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(planned[1].plan.title, "Séance 3");
}

#[tokio::test]
async fn test_too_few_sessions_fails_the_week() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut llm = MockLlm::new();
    llm.expect_complete().times(4).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => plan_reply("Seule séance"),
            _ => Err(LlmError::Upstream {
                status: 500,
                message: "overloaded".to_string(),
            }),
        }
    });

    let err = planner(llm)
        .plan_week(&context(), &preferences(4), week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Upstream(_)));
    assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_rate_limited_session_is_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut llm = MockLlm::new();
    llm.expect_complete().times(2).returning(move |_| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Err(LlmError::RateLimited),
            _ => plan_reply("Full body"),
        }
    });

    let planned = planner(llm)
        .plan_week(&context(), &preferences(1), week_start())
        .await
        .unwrap();

    assert_eq!(planned.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_max_attempts() {
    let mut llm = MockLlm::new();
    llm.expect_complete()
        .times(fitcoach::services::program_service::MAX_ATTEMPTS as usize)
        .returning(|_| Err(LlmError::RateLimited));

    let err = planner(llm)
        .plan_week(&context(), &preferences(1), week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Upstream(_)));
}

#[tokio::test]
async fn test_invalid_reply_is_not_retried() {
    let mut llm = MockLlm::new();
    llm.expect_complete().times(2).returning(|_| garbage_reply());

    let err = planner(llm)
        .plan_week(&context(), &preferences(2), week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Upstream(_)));
}
