mod common;

use common::{
    credentials, gemini_event, sse_frames, state, state_with, RejectingTokenSource, GEMINI_PATH,
    SEARCH_PATH,
};
use rag_orchestrator::credentials::CredentialManager;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_results() -> Value {
    json!({
        "totalSize": 3,
        "results": [
            {
                "document": {
                    "id": "d1",
                    "derivedStructData": {
                        "title": "[online-courses]",
                        "link": "gs://kb/json/online-courses.json",
                        "snippets": [{ "snippet": "AI for Business <b>online</b>" }],
                        "extractive_answers": [{ "content": "AI for Business covers prompt design." }]
                    }
                }
            },
            {
                "document": {
                    "id": "d2",
                    "derivedStructData": {
                        "title": "[ai-faqs]",
                        "link": "gs://kb/json/ai-faqs.json",
                        "snippets": [{ "snippet": "Do I need to code? No." }]
                    }
                }
            },
            {
                "document": {
                    "id": "d3",
                    "derivedStructData": {
                        "title": "[online-courses]",
                        "link": "gs://kb/json/online-courses.json",
                        "snippets": [{ "snippet": "Second chunk of the same source" }]
                    }
                }
            }
        ]
    })
}

async fn post_search(server: &MockServer, body: Value, with_model: bool) -> warp::http::Response<bytes::Bytes> {
    send(state(&server.uri(), with_model), body).await
}

async fn send(state: rag_orchestrator::api::AppState, body: Value) -> warp::http::Response<bytes::Bytes> {
    let filter = rag_orchestrator::app(state, &[]);
    warp::test::request()
        .method("POST")
        .path("/api/v1/search")
        .json(&body)
        .reply(&filter)
        .await
}

#[tokio::test]
async fn oversized_prompt_is_rejected_without_backend_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(0)
        .mount(&server)
        .await;

    for mode in ["direct", "streaming"] {
        let response = post_search(
            &server,
            json!({ "query": "hello", "mode": mode, "customSystemPrompt": "a".repeat(2001) }),
            true,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "invalid_configuration");
        assert!(body["error"].as_str().unwrap().contains("customSystemPrompt"));
    }
}

#[tokio::test]
async fn direct_search_returns_summary_with_distinct_citations() {
    let server = MockServer::start().await;
    let mut payload = search_results();
    payload["summary"] = json!({
        "summaryWithMetadata": {
            "summary": "มีคอร์ส AI for Business แบบออนไลน์",
            "references": [
                { "title": "[online-courses]", "uri": "gs://kb/json/online-courses.json",
                  "chunkContents": [{ "content": "AI for Business" }] },
                { "title": "[online-courses]", "uri": "gs://kb/json/online-courses.json",
                  "chunkContents": [{ "content": "again" }] },
                { "title": "[ai-faqs]", "uri": "gs://kb/json/ai-faqs.json",
                  "chunkContents": [{ "content": "Do I need to code?" }] }
            ]
        }
    });

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "query": "คอร์ส AI",
            "pageSize": 5,
            "contentSearchSpec": { "summarySpec": { "summaryResultCount": 5, "includeCitations": true } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload))
        .expect(1)
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "คอร์ส AI", "mode": "direct" }), true).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "direct");
    assert_eq!(body["totalResults"], 3);
    assert!(!body["summary"].as_str().unwrap().is_empty());
    assert!(body["responseTime"].as_f64().unwrap() >= 0.0);

    let citations = body["citations"].as_array().unwrap();
    let ids: HashSet<&str> = citations.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), citations.len());
    assert_eq!(citations[0]["id"], "online-courses");
    assert_eq!(citations[0]["title"], "คอร์สออนไลน์");
    assert!(citations.iter().all(|c| c["url"].is_null()));
}

#[tokio::test]
async fn citations_never_exceed_total_results() {
    let server = MockServer::start().await;
    let mut payload = search_results();
    payload.as_object_mut().unwrap().remove("totalSize");
    payload["results"].as_array_mut().unwrap().truncate(1);
    payload["summary"] = json!({
        "summaryWithMetadata": {
            "summary": "สองแหล่ง",
            "references": [
                { "title": "[online-courses]", "uri": "gs://kb/json/online-courses.json" },
                { "title": "[ai-faqs]", "uri": "gs://kb/json/ai-faqs.json" }
            ]
        }
    });
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload))
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "คอร์ส AI", "mode": "direct" }), true).await;

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    let citations = body["citations"].as_array().unwrap().len() as u64;
    assert_eq!(citations, 2);
    assert!(citations <= body["totalResults"].as_u64().unwrap());
}

#[tokio::test]
async fn retryable_search_failure_is_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(1)
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "python", "mode": "direct" }), true).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["summary"], "No suitable answer was found in the knowledge base.");
    assert_eq!(body["citations"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn non_retryable_search_failure_surfaces_as_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid filter"))
        .expect(1)
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "python", "mode": "direct" }), true).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "retrieval_failed");
}

#[tokio::test]
async fn streaming_search_emits_deltas_then_one_final_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({
            "contentSearchSpec": { "extractiveContentSpec": { "maxExtractiveAnswerCount": 5 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(1)
        .mount(&server)
        .await;

    let sse = [
        gemini_event("Python is "),
        gemini_event("a programming "),
        gemini_event("language."),
    ]
    .concat();
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let response = post_search(
        &server,
        json!({ "query": "What is Python?", "mode": "streaming", "temperature": 0.2 }),
        true,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let frames = sse_frames(response.body());
    assert_eq!(frames.len(), 4);
    assert!(frames[..3].iter().all(|f| f["done"] == false));
    assert_eq!(frames.iter().filter(|f| f["done"] == true).count(), 1);

    let text: String = frames[..3].iter().map(|f| f["chunk"].as_str().unwrap()).collect();
    assert_eq!(text, "Python is a programming language.");

    let last = &frames[3];
    assert_eq!(last["chunk"], "");
    assert!(last["citations"].is_array());
    assert!(last["responseTime"].as_f64().unwrap() >= 0.0);

    let requests = server.received_requests().await.unwrap();
    let search_body: Value = requests
        .iter()
        .find(|r| r.url.path() == SEARCH_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .unwrap();
    assert!(search_body["contentSearchSpec"].get("summarySpec").is_none());

    let gemini_body: Value = requests
        .iter()
        .find(|r| r.url.path() == GEMINI_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .unwrap();
    let config = gemini_body["generationConfig"].as_object().unwrap();
    assert_eq!(config.len(), 1);
    assert!((config["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    let prompt = gemini_body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("AI for Business covers prompt design."));
    assert!(prompt.contains("Question: What is Python?"));
}

#[tokio::test]
async fn streaming_model_error_ends_with_error_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .mount(&server)
        .await;

    let sse = [
        gemini_event("one "),
        gemini_event("two "),
        gemini_event("three"),
        "data: {\"error\":{\"code\":503,\"message\":\"model overloaded\"}}\r\n\r\n".to_string(),
        gemini_event("never"),
    ]
    .concat();
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "count", "mode": "streaming" }), true).await;
    let frames = sse_frames(response.body());

    assert_eq!(frames.len(), 4);
    assert!(frames[..3].iter().all(|f| f["done"] == false));
    let last = &frames[3];
    assert_eq!(last["done"], true);
    assert_eq!(last["code"], "generation_failed");
    assert!(last["error"].as_str().unwrap().contains("model overloaded"));
    assert!(last.get("citations").is_none());
}

#[tokio::test]
async fn streaming_retrieval_failure_is_a_single_error_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "python" }), true).await;

    assert_eq!(response.status(), StatusCode::OK);
    let frames = sse_frames(response.body());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["done"], true);
    assert_eq!(frames[0]["chunk"], "");
    assert_eq!(frames[0]["code"], "retrieval_failed");
}

#[tokio::test]
async fn streaming_without_model_reports_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let response = post_search(&server, json!({ "query": "python" }), false).await;
    let frames = sse_frames(response.body());

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["done"], true);
    assert_eq!(frames[0]["code"], "generation_failed");
}

#[tokio::test]
async fn unparseable_body_is_a_bad_request() {
    let server = MockServer::start().await;
    let filter = rag_orchestrator::app(state(&server.uri(), true), &[]);
    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/search")
        .header("content-type", "application/json")
        .body("{\"query\": ")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["error"], "Bad request");
}

#[tokio::test]
async fn mistyped_fields_are_configuration_errors() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(0)
        .mount(&server)
        .await;

    let cases = [
        (json!({ "query": "hi", "mode": "direct", "queryExpansion": "SOMETIMES" }), "queryExpansion", "direct"),
        (json!({ "query": "hi", "mode": "streaming", "queryExpansion": "SOMETIMES" }), "queryExpansion", "streaming"),
        (json!({ "query": "hi", "mode": "streaming", "topK": -1 }), "topK", "streaming"),
        (json!({ "mode": "direct" }), "query", "direct"),
    ];
    for (body, field, mode) in cases {
        let response = post_search(&server, body, true).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["mode"], mode);
        assert_eq!(body["code"], "invalid_configuration");
        assert!(body["error"].as_str().unwrap().contains(field));
    }
}

#[tokio::test]
async fn model_name_cannot_change_the_generation_endpoint() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(0)
        .mount(&server)
        .await;

    let response = post_search(
        &server,
        json!({ "query": "hi", "model": "gemini-2.0-flash:generateContent?x=" }),
        true,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["code"], "invalid_configuration");
    assert!(body["error"].as_str().unwrap().contains("model"));
}

async fn mount_search(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .mount(server)
        .await;
}

async fn stream_with_model_body(server: &MockServer, sse: String) -> Vec<Value> {
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(server)
        .await;

    let response = post_search(server, json!({ "query": "python" }), true).await;
    assert_eq!(response.status(), StatusCode::OK);
    sse_frames(response.body())
}

#[tokio::test]
async fn empty_model_stream_is_not_an_answer() {
    let server = MockServer::start().await;
    mount_search(&server).await;

    let frames = stream_with_model_body(&server, String::new()).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["done"], true);
    assert_eq!(frames[0]["code"], "generation_failed");
    assert!(frames[0].get("citations").is_none());
}

#[tokio::test]
async fn blocked_prompt_ends_with_error_frame() {
    let server = MockServer::start().await;
    mount_search(&server).await;

    let blocked = "data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\r\n\r\n".to_string();
    let frames = stream_with_model_body(&server, blocked).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["code"], "generation_failed");
    assert!(frames[0]["error"].as_str().unwrap().contains("SAFETY"));
}

#[tokio::test]
async fn last_event_without_newline_is_delivered() {
    let server = MockServer::start().await;
    mount_search(&server).await;

    let mut sse = gemini_event("Python is ");
    sse.push_str(gemini_event("a language.").trim_end());
    let frames = stream_with_model_body(&server, sse).await;

    assert_eq!(frames.len(), 3);
    let text: String = frames[..2].iter().map(|f| f["chunk"].as_str().unwrap()).collect();
    assert_eq!(text, "Python is a language.");
    assert_eq!(frames[2]["done"], true);
    assert!(frames[2]["citations"].is_array());
}

#[tokio::test]
async fn retrieval_timeout_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_results())
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let slow = || state_with(&server.uri(), true, credentials(), Duration::from_millis(100));

    let response = send(slow(), json!({ "query": "python", "mode": "direct" })).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "retrieval_timeout");

    let response = send(slow(), json!({ "query": "python", "mode": "streaming" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let frames = sse_frames(response.body());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["done"], true);
    assert_eq!(frames[0]["code"], "retrieval_timeout");
}

#[tokio::test]
async fn credential_failure_stops_before_search() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(search_results()))
        .expect(0)
        .mount(&server)
        .await;
    let rejected = || {
        let credentials = Arc::new(CredentialManager::new(Arc::new(RejectingTokenSource)));
        state_with(&server.uri(), true, credentials, Duration::from_secs(5))
    };

    let response = send(rejected(), json!({ "query": "python", "mode": "direct" })).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "authentication_failed");

    let response = send(rejected(), json!({ "query": "python", "mode": "streaming" })).await;
    let frames = sse_frames(response.body());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["code"], "authentication_failed");
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    rag_orchestrator::metrics::init();
    let server = MockServer::start().await;
    let filter = rag_orchestrator::app(state(&server.uri(), true), &[]);

    let health = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(health.status(), StatusCode::OK);

    let metrics = warp::test::request().path("/metrics").reply(&filter).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = String::from_utf8_lossy(metrics.body());
    assert!(text.contains("credential_refreshes_total"));
}
