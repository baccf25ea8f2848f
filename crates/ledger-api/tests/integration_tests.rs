//! Integration tests for the Ledger chat API.
//!
//! Each test builds its own router over an in-memory table store and a
//! scripted completion backend, and drives it with `oneshot` requests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use ledger_api::create_router;
use ledger_api::error::ErrorBody;
use ledger_api::handlers::{ChatResponse, ClearResponse, HealthResponse};
use ledger_api::session::SESSION_COOKIE;
use ledger_api::state::AppState;
use ledger_chat::{ChatOrchestrator, MockLlm};
use ledger_core::config::LedgerConfig;
use ledger_core::table::{Table, Value as Cell};
use ledger_storage::TableStore;

// =============================================================================
// Helpers
// =============================================================================

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn make_store() -> TableStore {
    TableStore::from_tables(
        Table::with_rows(
            "accounts",
            cols(&["account", "sector", "employees"]),
            vec![
                vec![text("Acme Corp"), text("technology"), Cell::Integer(1200)],
                vec![text("Globex"), text("retail"), Cell::Integer(95)],
            ],
        ),
        Table::with_rows(
            "products",
            cols(&["product", "sales_price"]),
            vec![vec![text("GTX Basic"), Cell::Integer(550)]],
        ),
        Table::with_rows(
            "sales_teams",
            cols(&["sales_agent", "manager"]),
            vec![
                vec![text("Sam"), text("Jane Doe")],
                vec![text("Lee"), text("Jane Doe")],
            ],
        ),
        Table::with_rows(
            "sales_pipeline",
            cols(&["opportunity_id", "account", "deal_stage"]),
            vec![
                vec![text("A1"), text("Acme Corp"), text("Prospecting")],
                vec![text("A2"), text("Globex"), text("Won")],
            ],
        ),
        Table::with_rows(
            "interactions",
            cols(&["contact_name", "timestamp", "notes"]),
            vec![vec![text("Ada Park"), text("2024-01-02"), text("intro call")]],
        ),
    )
}

/// Create a fresh state whose model replies are scripted.
fn make_state(replies: Vec<Result<&str, &str>>) -> (AppState, Arc<MockLlm>) {
    let config = LedgerConfig::default();
    let mock = Arc::new(MockLlm::with_replies(
        replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string)),
    ));
    let orchestrator = ChatOrchestrator::new(
        Arc::new(make_store()),
        mock.clone(),
        &config.llm,
        &config.chat,
    );
    (AppState::new(orchestrator, config), mock)
}

/// Build a POST request with a JSON body and optional session cookie.
fn post_json(uri: &str, json: &str, session: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, id));
    }
    builder.body(Body::from(json.to_string())).unwrap()
}

fn get_with_session(uri: &str, session: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(id) = session {
        builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, id));
    }
    builder.body(Body::empty()).unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

/// Session id from the response's Set-Cookie header, if any.
fn issued_session(resp: &axum::response::Response) -> Option<Uuid> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let pair = v.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            if name.trim() == SESSION_COOKIE {
                Uuid::parse_str(value.trim()).ok()
            } else {
                None
            }
        })
}

// =============================================================================
// GET /
// =============================================================================

#[tokio::test]
async fn test_index_serves_page_and_issues_session() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(get_with_session("/", None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(issued_session(&resp).is_some());

    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(body.contains("Ledger CRM Assistant"));
}

#[tokio::test]
async fn test_index_resets_existing_session() {
    let (state, _) = make_state(vec![Ok("general_question"), Ok("Hello!")]);
    let app = create_router(state.clone());
    let sid = Uuid::new_v4();

    let resp = app
        .clone()
        .oneshot(post_json("/chat", r#"{"message":"hi"}"#, Some(sid)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!state.orchestrator.memory().render(sid).unwrap().is_empty());

    let resp = app.oneshot(get_with_session("/", Some(sid))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let fresh = issued_session(&resp).unwrap();
    assert_ne!(fresh, sid);
    assert_eq!(state.orchestrator.memory().render(sid).unwrap(), "");
}

// =============================================================================
// POST /chat
// =============================================================================

#[tokio::test]
async fn test_chat_returns_rendered_html() {
    let (state, mock) = make_state(vec![
        Ok("account_info"),
        Ok("**Acme Corp** is a technology account."),
    ]);
    let sid = Uuid::new_v4();

    let resp = create_router(state)
        .oneshot(post_json(
            "/chat",
            r#"{"message":"What's the status with Acme Corp?"}"#,
            Some(sid),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: ChatResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(
        body.html,
        "<p><strong>Acme Corp</strong> is a technology account.</p>\n"
    );

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].prompt.contains("=== ACCOUNTS DATA ==="));
    assert!(!requests[1].prompt.contains("Globex"));
}

#[tokio::test]
async fn test_chat_escapes_markup_in_answer() {
    let (state, _) = make_state(vec![
        Ok("account_info"),
        Ok("Acme Corp <img src=x onerror=alert(1)>\n\n<script>alert(2)</script>\n"),
    ]);

    let resp = create_router(state)
        .oneshot(post_json(
            "/chat",
            r#"{"message":"Tell me about Acme Corp"}"#,
            Some(Uuid::new_v4()),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: ChatResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(!body.html.contains("<img"));
    assert!(!body.html.contains("<script>"));
    assert!(body.html.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_chat_without_cookie_issues_session() {
    let (state, _) = make_state(vec![Ok("general_question"), Ok("Hi.")]);
    let resp = create_router(state.clone())
        .oneshot(post_json("/chat", r#"{"message":"hello"}"#, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let sid = issued_session(&resp).unwrap();
    assert_eq!(
        state.orchestrator.memory().render(sid).unwrap(),
        "\nUser: hello\nBot: Hi.\n"
    );
}

#[tokio::test]
async fn test_chat_memory_carries_across_turns() {
    let (state, mock) = make_state(vec![
        Ok("sales_hierarchy"),
        Ok("Jane Doe manages Sam and Lee."),
        Ok("followup"),
        Ok("Both are in her team."),
    ]);
    let app = create_router(state);
    let sid = Uuid::new_v4();

    let first = app
        .clone()
        .oneshot(post_json(
            "/chat",
            r#"{"message":"What does Jane Doe's team look like?"}"#,
            Some(sid),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/chat", r#"{"message":"and who is newest?"}"#, Some(sid)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let requests = mock.requests();
    assert!(requests[1].prompt.contains("=== SALES_TEAM DATA ==="));
    assert!(requests[3].prompt.contains(
        "=== CONVERSATION MEMORY ===\n\nUser: What does Jane Doe's team look like?\nBot: Jane Doe manages Sam and Lee.\n"
    ));
}

#[tokio::test]
async fn test_chat_sessions_are_isolated() {
    let (state, mock) = make_state(vec![
        Ok("general_question"),
        Ok("one"),
        Ok("general_question"),
        Ok("two"),
    ]);
    let app = create_router(state);

    app.clone()
        .oneshot(post_json("/chat", r#"{"message":"first"}"#, Some(Uuid::new_v4())))
        .await
        .unwrap();
    app.oneshot(post_json("/chat", r#"{"message":"second"}"#, Some(Uuid::new_v4())))
        .await
        .unwrap();

    assert!(!mock.requests()[3].prompt.contains("CONVERSATION MEMORY"));
}

#[tokio::test]
async fn test_chat_empty_message_is_bad_request() {
    let (state, mock) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(post_json("/chat", r#"{"message":"   "}"#, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.error, "bad_request");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_chat_missing_message_is_bad_request() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(post_json("/chat", r#"{}"#, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_malformed_json_is_bad_request() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(post_json("/chat", "{not json", None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_chat_missing_content_type_is_bad_request() {
    let (state, _) = make_state(vec![]);
    let req = Request::post("/chat")
        .body(Body::from(r#"{"message":"hi"}"#))
        .unwrap();
    let resp = create_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_message_too_long_is_bad_request() {
    let (state, _) = make_state(vec![]);
    let long = "a".repeat(2001);
    let resp = create_router(state)
        .oneshot(post_json("/chat", &format!(r#"{{"message":"{}"}}"#, long), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(body.message.contains("2000"));
}

#[tokio::test]
async fn test_chat_classification_failure_still_succeeds() {
    let (state, mock) = make_state(vec![Err("timeout"), Ok("I can help with CRM questions.")]);
    let resp = create_router(state)
        .oneshot(post_json("/chat", r#"{"message":"hi"}"#, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: ChatResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.html, "<p>I can help with CRM questions.</p>\n");
    assert!(mock.requests()[1].prompt.contains("=== NO MATCHING DATA ==="));
}

#[tokio::test]
async fn test_chat_synthesis_failure_returns_apology() {
    let (state, _) = make_state(vec![Ok("pipeline_info"), Err("HTTP 503")]);
    let apology = state.config.chat.apology_message.clone();

    let resp = create_router(state)
        .oneshot(post_json("/chat", r#"{"message":"show me closed deals"}"#, None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: ChatResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(body.html.contains(&apology));
}

// =============================================================================
// POST /clear
// =============================================================================

#[tokio::test]
async fn test_clear_forgets_memory() {
    let (state, _) = make_state(vec![Ok("general_question"), Ok("Hello!")]);
    let app = create_router(state.clone());
    let sid = Uuid::new_v4();

    app.clone()
        .oneshot(post_json("/chat", r#"{"message":"hi"}"#, Some(sid)))
        .await
        .unwrap();

    let resp = app.oneshot(post_json("/clear", "", Some(sid))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ClearResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.status, "cleared");
    assert_eq!(state.orchestrator.memory().render(sid).unwrap(), "");
}

#[tokio::test]
async fn test_clear_without_session_is_ok() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(Request::post("/clear").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn test_health_reports_table_sizes() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(get_with_session("/health", None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.status, "healthy");
    assert_eq!(body.version, "0.1.0");
    assert_eq!(body.tables.len(), 5);
    assert_eq!(body.tables["accounts"], 2);
    assert_eq!(body.tables["sales_pipeline"], 2);
    assert_eq!(body.tables["interactions"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (state, _) = make_state(vec![]);
    let resp = create_router(state)
        .oneshot(get_with_session("/nope", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
