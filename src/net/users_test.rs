use super::*;
use crate::config::ClientConfig;
use crate::state::auth::AuthStore;
use crate::state::history::{HistoryPaginator, PAGE_SIZE};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(server: &MockServer) -> UserService {
    let config = ClientConfig::default().with_base_url(&server.uri()).unwrap();
    let auth = Arc::new(AuthStore::in_memory(Some("tok".to_owned())));
    UserService::new(ApiClient::new(&config, auth).unwrap())
}

fn profile_json(nickname: &str) -> serde_json::Value {
    json!({
        "user_id": 9,
        "name": nickname,
        "nickname": nickname,
        "email": null,
        "user_type": "SOCIAL",
        "status": "ACTIVE",
        "join_date": "2025-03-01T09:00:00",
        "total_chats": 4,
        "total_tests": 2,
    })
}

fn history_items(range: std::ops::Range<usize>) -> Vec<serde_json::Value> {
    range
        .map(|i| {
            json!({
                "id": format!("session-{i}"),
                "character_name": "슬픔이",
                "character_avatar": "🤖",
                "date": "2025-03-02",
                "last_message_time": "2025-03-02T10:00:00",
                "messages": [
                    { "text": "안녕", "sender": "user", "timestamp": "2025-03-02T10:00:00" },
                    { "text": "안녕...", "sender": "ai", "timestamp": "2025-03-02T10:00:05" },
                ],
            })
        })
        .collect()
}

// =============================================================
// Profile cache
// =============================================================

#[tokio::test]
async fn profile_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("Alice")))
        .expect(1)
        .mount(&server)
        .await;

    let users = service_for(&server);
    let first = users.profile(9).await.unwrap();
    let second = users.profile(9).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.name, "Alice");
    assert_eq!(first.total_chats, 4);
    assert!(first.join_date.is_some());
}

#[tokio::test]
async fn update_invalidates_cached_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("Alice")))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/users/9"))
        .and(body_json(json!({ "nickname": "Bob" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": 9,
            "nickname": "Bob",
            "user_type": "SOCIAL",
            "status": "ACTIVE",
            "created_at": "2025-03-01T09:00:00",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users = service_for(&server);
    users.profile(9).await.unwrap();
    assert_eq!(users.update_nickname(9, "Bob").await.unwrap(), "Bob");
    users.profile(9).await.unwrap();
}

#[tokio::test]
async fn failed_update_keeps_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_json("Alice")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/users/users/9"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "detail": "이미 사용 중인 닉네임입니다." })))
        .mount(&server)
        .await;

    let users = service_for(&server);
    users.profile(9).await.unwrap();
    let err = users.update_nickname(9, "Bob").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 400, .. }));
    assert_eq!(users.profile(9).await.unwrap().name, "Alice");
}

#[tokio::test]
async fn check_nickname_passes_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/users/9/check-nickname"))
        .and(query_param("nickname", "꿈탐험가"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "available": false,
            "message": "이미 사용 중인 닉네임입니다.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users = service_for(&server);
    let check = users.check_nickname(9, "꿈탐험가").await.unwrap();
    assert!(!check.available);
    assert_eq!(check.message, "이미 사용 중인 닉네임입니다.");
}

// =============================================================
// Listings
// =============================================================

#[test]
fn lower_bound_total_counts_one_past_a_full_page() {
    assert_eq!(lower_bound_total(0, 5, true), 6);
    assert_eq!(lower_bound_total(5, 2, false), 7);
    assert_eq!(lower_bound_total(0, 0, false), 0);
}

#[tokio::test]
async fn chat_history_pages_through_paginator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/chat-history"))
        .and(query_param("skip", "0"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chat_history": history_items(0..5),
            "total": 5,
            "has_more": true,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/chat-history"))
        .and(query_param("skip", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chat_history": history_items(5..7),
            "total": 2,
            "has_more": false,
        })))
        .mount(&server)
        .await;

    let users = service_for(&server);
    let paginator: HistoryPaginator<ChatHistoryEntry, _> = HistoryPaginator::new(Arc::new(users.chat_history_source(9)));

    assert_eq!(paginator.load_more().await.unwrap(), PAGE_SIZE);
    assert!(paginator.has_more());
    assert_eq!(paginator.load_more().await.unwrap(), 2);
    assert!(!paginator.has_more());

    let items = paginator.items();
    assert_eq!(items.len(), 7);
    assert_eq!(items[0].last_message, "안녕...");
    assert_eq!(items[6].id, "session-6");
}

#[tokio::test]
async fn test_results_map_to_read_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/users/9/test-results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "test_results": [{
                "id": "31",
                "test_type": "그림 검사",
                "character_match": "슬픔이",
                "interpretation": "조용한 집 그림",
                "date": "2025-03-03",
                "created_at": "2025-03-03T11:00:00",
                "images": ["/uploads/31.png"],
            }],
            "total": 1,
            "has_more": false,
        })))
        .mount(&server)
        .await;

    let users = service_for(&server);
    let page = users.test_results(9, 0, PAGE_SIZE).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].outcome, "슬픔이");
    assert_eq!(page.items[0].test_kind, "그림 검사");
    assert_eq!(page.items[0].images, vec!["/uploads/31.png".to_owned()]);
}
