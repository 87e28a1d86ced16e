//! End-to-end pipeline tests with fake embedding and generation providers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use docchat::config::AppConfig;
use docchat::embedding::EmbeddingProvider;
use docchat::error::{Error, Result};
use docchat::generation::{
    resolve_citations, AnswerStreamer, ContextAssembler, FragmentStream, GENERATION_FAILURE_TEXT,
};
use docchat::retrieval::Retriever;
use docchat::server::routes::api_routes;
use docchat::server::state::AppState;
use docchat::storage::SqliteStore;
use docchat::types::{Conversation, Message, Role, Segment, SourceRef};

/// Embedder that maps topic keywords onto fixed axes so retrieval is
/// deterministic; text with no known keyword lands on its own axis
struct TopicEmbedder {
    fail: bool,
}

fn topic_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 4];
    if text.contains("alpaca") {
        v[0] = 1.0;
    }
    if text.contains("meadow") {
        v[1] = 1.0;
    }
    if text.contains("quartz") {
        v[2] = 1.0;
    }
    if v.iter().all(|x| *x == 0.0) {
        v[3] = 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail {
            return Err(Error::embedding("embedding backend down"));
        }
        Ok(topic_vector(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if self.fail {
            return Err(Error::embedding("embedding backend down"));
        }
        Ok(texts.iter().map(|t| Some(topic_vector(t))).collect())
    }

    fn name(&self) -> &str {
        "topic"
    }
}

/// Streamer that replays a scripted fragment sequence and records the prompt
struct ScriptedStreamer {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    fail_start: bool,
    seen_prompt: Mutex<Option<String>>,
}

impl ScriptedStreamer {
    fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            fail_start: false,
            seen_prompt: Mutex::new(None),
        }
    }

    fn failing_after(fragments: &[&str], after: usize) -> Self {
        let mut streamer = Self::new(fragments);
        streamer.fail_after = Some(after);
        streamer
    }

    fn failing_at_start() -> Self {
        let mut streamer = Self::new(&[]);
        streamer.fail_start = true;
        streamer
    }
}

#[async_trait]
impl AnswerStreamer for ScriptedStreamer {
    async fn stream_answer(&self, prompt: &str) -> Result<FragmentStream> {
        *self.seen_prompt.lock() = Some(prompt.to_string());

        if self.fail_start {
            return Err(Error::generation("model unavailable"));
        }

        let mut items: Vec<Result<String>> = Vec::new();
        for (i, fragment) in self.fragments.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(Error::generation("connection reset")));
                break;
            }
            items.push(Ok(fragment.clone()));
        }

        Ok(futures_util::stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Three 69-char single-topic sections; with chunk_size 69 the chunker puts
/// one topic per window
fn topic_text() -> String {
    let sections: Vec<String> = ["alpaca", "meadow", "quartz"]
        .iter()
        .map(|word| vec![*word; 10].join(" "))
        .collect();
    sections.join(" ")
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.chunking.chunk_size = 69;
    config.chunking.chunk_overlap = 0;
    config.retrieval.top_k = 2;
    config
}

struct Harness {
    router: Router,
    store: Arc<SqliteStore>,
    streamer: Arc<ScriptedStreamer>,
}

fn harness(embedder_fails: bool, streamer: ScriptedStreamer) -> Harness {
    let config = test_config();
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let streamer = Arc::new(streamer);
    let state = AppState::with_providers(
        config.clone(),
        Arc::clone(&store),
        Arc::new(TopicEmbedder {
            fail: embedder_fails,
        }),
        streamer.clone(),
    );

    let router = Router::new()
        .nest("/api", api_routes(config.server.max_upload_size))
        .with_state(state);

    Harness {
        router,
        store,
        streamer,
    }
}

async fn ingest_topics(harness: &Harness) -> (Uuid, Conversation) {
    let config = test_config();
    let state = AppState::with_providers(
        config,
        Arc::clone(&harness.store),
        Arc::new(TopicEmbedder { fail: false }),
        harness.streamer.clone(),
    );
    let document = state
        .pipeline()
        .ingest_text("topics.pdf", &topic_text())
        .await
        .unwrap();

    let conversation = Conversation::new(document.id);
    harness.store.insert_conversation(&conversation).unwrap();
    (document.id, conversation)
}

async fn post_chat(router: Router, conversation_id: Uuid, message: &str) -> axum::http::Response<Body> {
    let body = serde_json::json!({
        "conversation_id": conversation_id,
        "message": message,
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router.oneshot(request).await.unwrap()
}

async fn wait_for_messages(
    store: &SqliteStore,
    conversation_id: Uuid,
    count: usize,
) -> Vec<Message> {
    for _ in 0..200 {
        let messages = store.list_messages(conversation_id).unwrap();
        if messages.len() >= count {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} messages", count);
}

#[tokio::test]
async fn long_document_splits_into_overlapping_windows() {
    let harness = harness(false, ScriptedStreamer::new(&[]));
    let config = AppConfig::default();
    let state = AppState::with_providers(
        config,
        Arc::clone(&harness.store),
        Arc::new(TopicEmbedder { fail: false }),
        harness.streamer.clone(),
    );

    // 4500 chars with size 2000 / overlap 200 -> windows at 0, 1800, 3600
    let document = state
        .pipeline()
        .ingest_text("long.pdf", &"w".repeat(4500))
        .await
        .unwrap();

    assert_eq!(document.total_chunks, 3);
    assert_eq!(harness.store.chunk_count(document.id).unwrap(), 3);
}

#[tokio::test]
async fn chat_streams_answer_with_sources_header() {
    let harness = harness(
        false,
        ScriptedStreamer::new(&["According to the text [1]", " and [2]", "."]),
    );
    let (_, conversation) = ingest_topics(&harness).await;

    let response = post_chat(harness.router.clone(), conversation.id, "tell me about the alpaca").await;
    assert_eq!(response.status(), StatusCode::OK);

    let encoded = response
        .headers()
        .get("x-sources")
        .expect("X-Sources header missing")
        .to_str()
        .unwrap()
        .to_string();
    let sources: Vec<SourceRef> =
        serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();

    // Rank 1 is the alpaca chunk (storage index 0); rank 2 falls back to the
    // lowest-index zero-similarity chunk
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].chunk_index, 0);
    assert!(sources[0].preview.contains("alpaca"));
    assert_eq!(sources[1].chunk_index, 1);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"According to the text [1] and [2].");

    // The prompt the model saw carries the numbered context and the question
    let prompt = harness.streamer.seen_prompt.lock().clone().unwrap();
    assert!(prompt.contains("[1] (fragment 0):"));
    assert!(prompt.contains("[2] (fragment 1):"));
    assert!(prompt.contains("tell me about the alpaca"));

    let messages = wait_for_messages(&harness.store, conversation.id, 2).await;
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "tell me about the alpaca");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "According to the text [1] and [2].");
    assert_eq!(messages[1].sources.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn retrieved_citations_resolve_to_source_chunks() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TopicEmbedder { fail: false });
    let config = test_config();
    let state = AppState::with_providers(
        config,
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::new(ScriptedStreamer::new(&[])),
    );
    let document = state
        .pipeline()
        .ingest_text("topics.pdf", &topic_text())
        .await
        .unwrap();

    let retriever = Retriever::new(Arc::clone(&embedder), store.clone());
    let matches = retriever
        .retrieve("what do we know about quartz?", document.id, 2)
        .await
        .unwrap();
    assert!(matches[0].content.contains("quartz"));

    let assembled = ContextAssembler::assemble("what do we know about quartz?", &matches);
    let segments = resolve_citations(
        "It is a mineral [1], also mentioned in [2]. Unrelated [7].",
        &assembled.entries,
    );

    let cited: Vec<_> = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Citation { entry, .. } => Some(entry),
            _ => None,
        })
        .collect();
    assert_eq!(cited.len(), 2);
    assert_eq!(cited[0].chunk_id, matches[0].chunk_id);
    assert_eq!(cited[1].chunk_id, matches[1].chunk_id);
    assert!(cited[0].content.contains("quartz"));
}

#[tokio::test]
async fn midstream_failure_substitutes_apology_and_persists_it() {
    let harness = harness(
        false,
        ScriptedStreamer::failing_after(&["partial ", "never sent"], 1),
    );
    let (_, conversation) = ingest_topics(&harness).await;

    let response = post_chat(harness.router.clone(), conversation.id, "alpaca?").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let expected = format!("partial {}", GENERATION_FAILURE_TEXT);
    assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);

    // Stored history matches what the client saw, apology included
    let messages = wait_for_messages(&harness.store, conversation.id, 2).await;
    assert_eq!(messages[1].content, expected);
}

#[tokio::test]
async fn failure_before_first_fragment_still_delivers_apology() {
    let harness = harness(false, ScriptedStreamer::failing_at_start());
    let (_, conversation) = ingest_topics(&harness).await;

    let response = post_chat(harness.router.clone(), conversation.id, "alpaca?").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(body.to_vec()).unwrap(), GENERATION_FAILURE_TEXT);

    let messages = wait_for_messages(&harness.store, conversation.id, 2).await;
    assert_eq!(messages[1].content, GENERATION_FAILURE_TEXT);
}

#[tokio::test]
async fn query_embedding_failure_is_service_unavailable() {
    let working = harness(false, ScriptedStreamer::new(&[]));
    let (document_id, _) = ingest_topics(&working).await;

    // Same store, but the query-time embedder is down
    let failing = Harness {
        router: {
            let config = test_config();
            let state = AppState::with_providers(
                config.clone(),
                Arc::clone(&working.store),
                Arc::new(TopicEmbedder { fail: true }),
                Arc::new(ScriptedStreamer::new(&["unused"])),
            );
            Router::new()
                .nest("/api", api_routes(config.server.max_upload_size))
                .with_state(state)
        },
        store: Arc::clone(&working.store),
        streamer: Arc::clone(&working.streamer),
    };

    let conversation = Conversation::new(document_id);
    failing.store.insert_conversation(&conversation).unwrap();

    let response = post_chat(failing.router.clone(), conversation.id, "alpaca?").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // The user message was persisted before the failure; no assistant reply
    let messages = failing.store.list_messages(conversation.id).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

#[tokio::test]
async fn chat_rejects_unknown_conversation_and_empty_message() {
    let harness = harness(false, ScriptedStreamer::new(&[]));
    let (_, conversation) = ingest_topics(&harness).await;

    let response = post_chat(harness.router.clone(), Uuid::new_v4(), "hello").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post_chat(harness.router.clone(), conversation.id, "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversation_requires_existing_document() {
    let harness = harness(false, ScriptedStreamer::new(&[]));

    let body = serde_json::json!({ "document_id": Uuid::new_v4() });
    let request = Request::builder()
        .method("POST")
        .uri("/api/conversations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_rejects_non_pdf_payloads() {
    let harness = harness(false, ScriptedStreamer::new(&[]));

    let boundary = "test-boundary";
    let payload = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\nplain text, not a pdf\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/documents")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(payload))
        .unwrap();

    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_document_removes_conversations() {
    let harness = harness(false, ScriptedStreamer::new(&[]));
    let (document_id, conversation) = ingest_topics(&harness).await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/documents/{}", document_id))
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(harness
        .store
        .get_conversation(conversation.id)
        .unwrap()
        .is_none());
}
