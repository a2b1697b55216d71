use std::sync::Arc;
use std::time::Duration;

use mcq_harness::embedding::VnptEmbedder;
use mcq_harness::gateway::vnpt::{TierConfig, VnptAdapter};
use mcq_harness::gateway::{GatewayConfig, ModelTier, NoopUsageSink, RetryingGateway};
use mcq_harness::router::classify;
use mcq_harness::router::{RouteLabel, Subtype};
use mcq_harness::solvers::{solve, SolverDeps};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tier(url: String) -> TierConfig {
    TierConfig {
        url,
        auth: "test-auth".into(),
        token_id: "test-id".into(),
        token_key: "test-key".into(),
    }
}

async fn deps_for(server: &MockServer) -> SolverDeps {
    let adapter = VnptAdapter::with_config(
        tier(format!("{}/small/chat", server.uri())),
        tier(format!("{}/large/chat", server.uri())),
        Duration::from_secs(5),
    )
    .unwrap();
    let gateway = RetryingGateway::with_config(
        adapter,
        Arc::new(NoopUsageSink),
        GatewayConfig {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(0),
        },
    );
    let embedder = VnptEmbedder::with_config(
        format!("{}/embed", server.uri()),
        "test-auth",
        "test-id",
        "test-key",
        Duration::from_secs(5),
    )
    .unwrap();

    SolverDeps {
        gateway: Arc::new(gateway),
        embedder: Arc::new(embedder),
        index: None,
    }
}

#[tokio::test]
async fn inline_passage_question_routes_to_rag_and_answers_from_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": [1.0, 0.0, 0.5] }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/large/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": {
                "content": "[PHÂN TÍCH]\nĐoạn thông tin nói rõ về bar.\n\n[ĐÁP ÁN]\nB"
            }}]
        })))
        .mount(&server)
        .await;

    let deps = deps_for(&server).await;
    let question = "Đoạn thông tin: sông Hồng chảy qua Hà Nội và đồng bằng Bắc Bộ.\nDòng sông nào chảy qua Hà Nội?";
    let choices = vec!["foo".to_string(), "bar".to_string()];

    // The marker short-circuits the router without touching the classifier.
    let decision = classify(&*deps.gateway, ModelTier::Large, question, &choices).await;
    assert_eq!(decision.label, RouteLabel::Rag);
    assert_eq!(decision.subtype, Subtype::Na);

    let answer = solve(&deps, decision, question, &choices).await;
    assert_eq!(answer, 'B');

    let requests = server.received_requests().await.unwrap();
    let embed_calls = requests.iter().filter(|r| r.url.path() == "/embed").count();
    let chat_calls = requests
        .iter()
        .filter(|r| r.url.path() == "/large/chat")
        .count();
    // One chunk plus the bare question, each embedded with its own call.
    assert_eq!(embed_calls, 2);
    // Exactly one completion: the answer extraction (no classifier call).
    assert_eq!(chat_calls, 1);
}

#[tokio::test]
async fn rag_without_context_skips_retrieval_entirely() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/large/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "[ĐÁP ÁN] A" } }]
        })))
        .mount(&server)
        .await;

    let deps = deps_for(&server).await;
    // Single line: no context above the question.
    let question = "Câu hỏi có nhắc đoạn thông tin nhưng chỉ một dòng?";
    let choices = vec!["x".to_string(), "y".to_string()];

    let decision = mcq_harness::RoutingDecision {
        label: RouteLabel::Rag,
        subtype: Subtype::Na,
    };
    let answer = solve(&deps, decision, question, &choices).await;
    assert_eq!(answer, 'A');

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/embed"));
}

#[tokio::test]
async fn rag_degrades_to_no_context_when_embedding_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/large/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "[ĐÁP ÁN] B" } }]
        })))
        .mount(&server)
        .await;

    let deps = deps_for(&server).await;
    let question = "Đoạn thông tin: một ít ngữ cảnh ở đây.\nCâu hỏi là gì?";
    let choices = vec!["x".to_string(), "y".to_string()];

    let decision = mcq_harness::RoutingDecision {
        label: RouteLabel::Rag,
        subtype: Subtype::Na,
    };
    // The embedding failure must not abort the solve.
    let answer = solve(&deps, decision, question, &choices).await;
    assert_eq!(answer, 'B');
}
