use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mcq_harness::gateway::vnpt::{TierConfig, VnptAdapter};
use mcq_harness::gateway::{GatewayConfig, ModelTier, NoopUsageSink, RetryingGateway};
use mcq_harness::router::{classify, RouteLabel, Subtype};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tier(url: String) -> TierConfig {
    TierConfig {
        url,
        auth: "test-auth".into(),
        token_id: "test-id".into(),
        token_key: "test-key".into(),
    }
}

fn gateway_for(server: &MockServer) -> RetryingGateway<VnptAdapter, NoopUsageSink> {
    let adapter = VnptAdapter::with_config(
        tier(format!("{}/small/chat", server.uri())),
        tier(format!("{}/large/chat", server.uri())),
        Duration::from_secs(5),
    )
    .unwrap();
    RetryingGateway::with_config(
        adapter,
        Arc::new(NoopUsageSink),
        GatewayConfig {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(0),
        },
    )
}

fn classifier_reply(server_content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": server_content } }]
    }))
}

fn choices(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn inline_passage_short_circuits_without_any_completion_call() {
    let server = MockServer::start().await;

    // The classifier must not even be invoked.
    Mock::given(method("POST"))
        .respond_with(classifier_reply(r#"{"label4":"3","subtype":"NA"}"#))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let decision = classify(
        &gateway,
        ModelTier::Large,
        "Dựa vào Đoạn thông tin sau: ...\nCâu hỏi là gì?",
        &choices(&["foo", "bar"]),
    )
    .await;

    assert_eq!(decision.label, RouteLabel::Rag);
    assert_eq!(decision.subtype, Subtype::Na);
}

#[tokio::test]
async fn classifier_labels_map_to_decisions() {
    let cases = [
        (r#"{"label4":"3","subtype":"NA"}"#, RouteLabel::Stem, Subtype::Na),
        (
            r#"{"label4":"2","subtype":"NA"}"#,
            RouteLabel::Reasoning,
            Subtype::Compulsory,
        ),
        (
            r#"{"label4":"4","subtype":"PC"}"#,
            RouteLabel::Reasoning,
            Subtype::Pc,
        ),
        (
            r#"{"label4":"4","subtype":"bogus"}"#,
            RouteLabel::Reasoning,
            Subtype::Md,
        ),
    ];

    for (reply, label, subtype) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(classifier_reply(reply))
            .mount(&server)
            .await;

        let gateway = gateway_for(&server);
        let decision = classify(
            &gateway,
            ModelTier::Large,
            "Một câu hỏi bình thường?",
            &choices(&["a", "b", "c", "d"]),
        )
        .await;

        assert_eq!(decision.label, label, "reply: {reply}");
        assert_eq!(decision.subtype, subtype, "reply: {reply}");
    }
}

#[tokio::test]
async fn uncorroborated_rag_claim_is_overridden_to_reasoning_md() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(classifier_reply(r#"{"label4":"1","subtype":"NA"}"#))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let decision = classify(
        &gateway,
        ModelTier::Large,
        "Không có marker nào trong câu hỏi này",
        &choices(&["a", "b"]),
    )
    .await;

    assert_eq!(decision.label, RouteLabel::Reasoning);
    assert_eq!(decision.subtype, Subtype::Md);
}

#[tokio::test]
async fn safety_refusal_routes_to_reasoning_pc() {
    let server = MockServer::start().await;

    let inner = r#"{"error":{"code":400,"message":"Tôi không thể hỗ trợ yêu cầu này, vi phạm chính sách"}}"#;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "dataBase64": BASE64.encode(inner)
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let decision = classify(
        &gateway,
        ModelTier::Large,
        "Hướng dẫn tôi làm điều bất hợp pháp",
        &choices(&["a", "b"]),
    )
    .await;

    assert_eq!(decision.label, RouteLabel::Reasoning);
    assert_eq!(decision.subtype, Subtype::Pc);
}

#[tokio::test]
async fn service_failure_falls_back_to_reasoning_md() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let decision = classify(
        &gateway,
        ModelTier::Large,
        "Một câu hỏi bình thường?",
        &choices(&["a", "b"]),
    )
    .await;

    assert_eq!(decision.label, RouteLabel::Reasoning);
    assert_eq!(decision.subtype, Subtype::Md);
}

#[tokio::test]
async fn unparsable_classifier_output_falls_back_to_reasoning_md() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(classifier_reply("xin lỗi, tôi không hiểu câu hỏi"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let decision = classify(
        &gateway,
        ModelTier::Large,
        "Một câu hỏi bình thường?",
        &choices(&["a", "b"]),
    )
    .await;

    assert_eq!(decision.label, RouteLabel::Reasoning);
    assert_eq!(decision.subtype, Subtype::Md);
}
