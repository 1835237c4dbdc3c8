//! The plain-text error body format (`<status> <reason>\n`) and the
//! status codes each error kind maps to.

mod common;

use common::{body, send, status_line, TestServer};

#[tokio::test]
async fn forbidden_response_has_plain_text_body() {
    let (server, _dir) = TestServer::start().await;
    let resp = send(
        server.port,
        "POST /sln/file HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nContent-Length: 6\r\n\r\nhello\n",
    )
    .await;
    assert_eq!(status_line(&resp), "HTTP/1.1 403 Forbidden");
    let text = body(&resp);
    assert!(text.starts_with("403 "));
    assert!(text.ends_with('\n'));
}

#[tokio::test]
async fn bad_credentials_are_forbidden() {
    let (server, _dir) = TestServer::start().await;
    let resp = send(
        server.port,
        "POST /sln/auth HTTP/1.1\r\nHost: x\r\nContent-Length: 21\r\n\r\nuser=ghost&pass=wrong",
    )
    .await;
    assert_eq!(status_line(&resp), "HTTP/1.1 403 Forbidden");
    assert!(body(&resp).starts_with("403 "));
}

#[tokio::test]
async fn missing_user_field_is_bad_request() {
    let (server, _dir) = TestServer::start().await;
    let resp = send(
        server.port,
        "POST /sln/auth HTTP/1.1\r\nHost: x\r\nContent-Length: 6\r\n\r\npass=x",
    )
    .await;
    assert_eq!(status_line(&resp), "HTTP/1.1 400 Bad Request");
    assert!(body(&resp).starts_with("400 "));
}
