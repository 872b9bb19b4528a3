// HTTP clients against a mocked upstream

mod common;

use assert_matches::assert_matches;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fitcoach::llm::{ChatMessage, ChatRequest, LlmError, LlmGateway, LlmProvider};
use fitcoach::services::auth_admin_client::AuthAdminError;
use fitcoach::services::email_service::{templates, EmailError};
use fitcoach::services::stripe_client::{CheckoutParams, StripeError};
use fitcoach::services::{AuthAdminClient, EmailService, ExerciseApiClient, StripeClient};

use common::test_integrations;

fn sample_request() -> ChatRequest {
    ChatRequest::new(vec![
        ChatMessage::system("Tu es un coach."),
        ChatMessage::user("Bonjour"),
    ])
}

#[tokio::test]
async fn test_llm_complete_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer llm_test_key"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{
                "message": { "role": "assistant", "content": "Salut !" },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = LlmGateway::new(&test_integrations(&server.uri()).llm).unwrap();
    let response = gateway.complete(&sample_request()).await.unwrap();

    assert_eq!(response.content, "Salut !");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_llm_rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let gateway = LlmGateway::new(&test_integrations(&server.uri()).llm).unwrap();
    let err = gateway.complete(&sample_request()).await.unwrap_err();

    assert_eq!(err, LlmError::RateLimited);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_llm_upstream_error_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": { "message": "model overloaded" } })),
        )
        .mount(&server)
        .await;

    let gateway = LlmGateway::new(&test_integrations(&server.uri()).llm).unwrap();
    let err = gateway.complete(&sample_request()).await.unwrap_err();

    assert_matches!(err, LlmError::Upstream { status: 500, ref message } if message == "model overloaded");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_llm_stream_concatenates_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Bon\"},\"finish_reason\":null}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"jour\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let gateway = LlmGateway::new(&test_integrations(&server.uri()).llm).unwrap();
    let mut stream = gateway.complete_stream(&sample_request()).await.unwrap();

    let mut text = String::new();
    let mut finished = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        text.push_str(&chunk.delta);
        if chunk.is_final {
            finished = true;
            break;
        }
    }

    assert_eq!(text, "Bonjour");
    assert!(finished);
}

/// Serve one streaming reply as chunked frames, one frame per slice
async fn serve_chunked_once(listener: TcpListener, frames: Vec<Vec<u8>>) {
    let (mut socket, _) = listener.accept().await.unwrap();

    // Drain the request (headers plus JSON body) before answering
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= end + 4 + length {
                break;
            }
        }
    }

    socket
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
        .await
        .unwrap();
    for frame in frames {
        socket
            .write_all(format!("{:x}\r\n", frame.len()).as_bytes())
            .await
            .unwrap();
        socket.write_all(&frame).await.unwrap();
        socket.write_all(b"\r\n").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // The client may already have hung up after the final event
    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.flush().await;
}

#[tokio::test]
async fn test_llm_stream_keeps_accents_split_across_frames() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"été\"},\"finish_reason\":null}]}\n\n",
        "data: [DONE]\n\n",
    )
    .as_bytes();
    let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_chunked_once(
        listener,
        vec![body[..split].to_vec(), body[split..].to_vec()],
    ));

    let gateway = LlmGateway::new(&test_integrations(&base_url).llm).unwrap();
    let mut stream = gateway.complete_stream(&sample_request()).await.unwrap();

    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        text.push_str(&chunk.delta);
        if chunk.is_final {
            break;
        }
    }

    assert_eq!(text, "été");
    server.await.unwrap();
}

#[tokio::test]
async fn test_llm_without_key_is_not_configured() {
    let mut settings = test_integrations("http://127.0.0.1:9").llm;
    settings.api_key = String::new();

    let gateway = LlmGateway::new(&settings).unwrap();
    assert_eq!(
        gateway.complete(&sample_request()).await.unwrap_err(),
        LlmError::NotConfigured
    );
}

#[tokio::test]
async fn test_stripe_checkout_sends_price_and_user_reference() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4().to_string();
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("price_test_monthly"))
        .and(body_string_contains(user_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "url": "https://checkout.stripe.com/c/cs_test_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let stripe = StripeClient::new(&test_integrations(&server.uri()).stripe).unwrap();
    let session = stripe
        .create_checkout_session(CheckoutParams {
            user_id: &user_id,
            customer_id: None,
            customer_email: Some("lea@example.fr"),
            success_url: "https://coach.example.fr/abonnement?checkout=success",
            cancel_url: "https://coach.example.fr/abonnement?checkout=cancel",
        })
        .await
        .unwrap();

    assert_eq!(session.url.as_deref(), Some("https://checkout.stripe.com/c/cs_test_1"));
}

#[tokio::test]
async fn test_stripe_subscription_period_end_from_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/subscriptions/sub_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sub_123",
            "customer": "cus_123",
            "status": "active",
            "items": { "data": [{ "price": { "id": "price_test_monthly" }, "current_period_end": 1767225600 }] }
        })))
        .mount(&server)
        .await;

    let stripe = StripeClient::new(&test_integrations(&server.uri()).stripe).unwrap();
    let subscription = stripe.get_subscription("sub_123").await.unwrap();

    assert_eq!(subscription.price_id().as_deref(), Some("price_test_monthly"));
    assert_eq!(subscription.period_end().unwrap().timestamp(), 1767225600);
}

#[tokio::test]
async fn test_stripe_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub_missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": { "message": "No such subscription" } })),
        )
        .mount(&server)
        .await;

    let stripe = StripeClient::new(&test_integrations(&server.uri()).stripe).unwrap();
    let err = stripe.cancel_subscription("sub_missing").await.unwrap_err();

    assert_matches!(err, StripeError::Api { status: 404, ref message } if message == "No such subscription");
}

#[tokio::test]
async fn test_email_is_posted_to_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test_key"))
        .and(body_partial_json(json!({ "to": ["lea@example.fr"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
        .expect(1)
        .mount(&server)
        .await;

    let email = EmailService::new(&test_integrations(&server.uri()).email).unwrap();
    email
        .send("lea@example.fr", &templates::account_deleted())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_email_provider_failure_is_an_error_but_best_effort_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422))
        .expect(2)
        .mount(&server)
        .await;

    let email = EmailService::new(&test_integrations(&server.uri()).email).unwrap();
    let message = templates::password_recovery("https://auth.example.fr/verify?token=abc");

    assert_matches!(email.send("lea@example.fr", &message).await, Err(EmailError::Api(422)));
    email.send_best_effort("lea@example.fr", &message).await;
}

#[tokio::test]
async fn test_auth_admin_disable_sends_ban_duration() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    Mock::given(method("PUT"))
        .and(path(format!("/admin/users/{}", user_id)))
        .and(header("apikey", "service_role_test_key"))
        .and(body_partial_json(json!({ "ban_duration": "876000h" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/admin/users/{}", user_id)))
        .and(body_partial_json(json!({ "ban_duration": "none" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AuthAdminClient::new(&test_integrations(&server.uri()).auth_admin).unwrap();
    client.set_disabled(user_id, true).await.unwrap();
    client.set_disabled(user_id, false).await.unwrap();
}

#[tokio::test]
async fn test_auth_admin_delete_of_missing_user_succeeds() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/users/{}", user_id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = AuthAdminClient::new(&test_integrations(&server.uri()).auth_admin).unwrap();
    client.delete_user(user_id).await.unwrap();
}

#[tokio::test]
async fn test_auth_admin_recovery_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/generate_link"))
        .and(body_partial_json(json!({ "type": "recovery", "email": "lea@example.fr" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action_link": "https://auth.example.fr/verify?token=abc"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin/generate_link"))
        .and(body_partial_json(json!({ "email": "sans-lien@example.fr" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": {} })))
        .mount(&server)
        .await;

    let client = AuthAdminClient::new(&test_integrations(&server.uri()).auth_admin).unwrap();
    let link = client
        .generate_recovery_link("lea@example.fr", "https://coach.example.fr/reset-password")
        .await
        .unwrap();
    assert_eq!(link, "https://auth.example.fr/verify?token=abc");

    let err = client
        .generate_recovery_link("sans-lien@example.fr", "https://coach.example.fr/reset-password")
        .await
        .unwrap_err();
    assert_matches!(err, AuthAdminError::MissingField("action_link"));
}

#[tokio::test]
async fn test_exercise_lookup_returns_first_image() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exercises/name/squat%20bulgare"))
        .and(query_param("limit", "1"))
        .and(header("x-rapidapi-key", "rapid_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "squat bulgare", "gifUrl": "https://img.example.com/squat.gif" }
        ])))
        .mount(&server)
        .await;

    let client = ExerciseApiClient::new(&test_integrations(&server.uri()).exercises).unwrap();
    let image = client.find_image("squat bulgare").await.unwrap();

    assert_eq!(image.as_deref(), Some("https://img.example.com/squat.gif"));
}

#[tokio::test]
async fn test_exercise_lookup_without_match_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exercises/name/planche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = ExerciseApiClient::new(&test_integrations(&server.uri()).exercises).unwrap();
    assert_eq!(client.find_image("planche").await.unwrap(), None);
}
