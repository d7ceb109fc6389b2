use super::*;
use serde_json::json;

// =============================================================================
// wire types
// =============================================================================

#[test]
fn request_omits_absent_optional_fields() {
    let body = serde_json::to_value(SendNotificationRequest::new("hello")).expect("serialize");
    assert_eq!(body, json!({"message": "hello"}));
}

#[test]
fn request_serializes_type_and_payload() {
    let request = SendNotificationRequest::new("Book reserved")
        .with_kind("BookReserved")
        .with_payload(json!({"bookId": "b-1"}));
    let body = serde_json::to_value(&request).expect("serialize");
    assert_eq!(
        body,
        json!({"message": "Book reserved", "type": "BookReserved", "payload": {"bookId": "b-1"}})
    );
}

#[test]
fn response_parses() {
    let response: NotificationResponse =
        parse_body(r#"{"success":true,"message":"sent"}"#).expect("parse");
    assert_eq!(response, NotificationResponse { success: true, message: "sent".into() });
}

#[test]
fn remote_status_uses_camel_case() {
    let status: RemoteConnectionStatus =
        parse_body(r#"{"sessionId":"abc","connected":true,"activeConnections":3}"#).expect("parse");
    assert_eq!(
        status,
        RemoteConnectionStatus { session_id: "abc".into(), connected: true, active_connections: 3 }
    );
}

#[test]
fn malformed_body_is_parse_error() {
    let err = parse_body::<NotificationResponse>("").unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
    let err = parse_body::<NotificationResponse>(r#"{"success":"yes"}"#).unwrap_err();
    assert!(matches!(err, ApiError::Parse(_)));
}

#[test]
fn status_error_display_includes_code() {
    let err = ApiError::Status { status: 404, body: "missing".into() };
    assert_eq!(err.to_string(), "notification API returned HTTP 404");
}

// =============================================================================
// client
// =============================================================================

#[test]
fn subscribe_url_matches_transport_rule() {
    let api = NotificationApi::with_client(reqwest::Client::new(), "http://localhost:8080/");
    assert_eq!(api.subscribe_url("abc", None), "http://localhost:8080/subscribe/abc");
    assert_eq!(api.subscribe_url("abc", Some(0)), "http://localhost:8080/subscribe/abc");
    assert_eq!(api.subscribe_url("abc", Some(500)), "http://localhost:8080/subscribe/abc?timeout=500");
}

#[test]
fn client_builds_from_config() {
    let api = NotificationApi::new(&HubConfig::default()).expect("client").with_user_id("user-7");
    assert_eq!(api.user_id, "user-7");
    assert_eq!(api.base_url, "http://localhost:8080");
}
