//! Protocol-framing behavior exercised over a real connection: request
//! line parsing, `Content-Length` bounding, method dispatch for
//! GET vs HEAD, and chunked-response framing.

mod common;

use common::{body, header, send, status_line, TestServer};

#[tokio::test]
async fn head_request_omits_body_but_keeps_content_length() {
    let (server, _dir) = TestServer::start_public_read().await;
    let auth_txn = server.repo.env.begin(true).unwrap();
    stronglink::auth::create_user(&*auth_txn, stronglink::ids::UserId(1), "alice", "hunter2").unwrap();
    auth_txn.commit().unwrap();

    let auth_resp = send(
        server.port,
        "POST /sln/auth HTTP/1.1\r\nHost: x\r\nContent-Length: 23\r\n\r\nuser=alice&pass=hunter2",
    )
    .await;
    let cookie = header(&auth_resp, "Set-Cookie").unwrap().split(';').next().unwrap().to_string();

    send(
        server.port,
        &format!("POST /sln/file HTTP/1.1\r\nHost: x\r\nContent-Type: text/plain\r\nCookie: {cookie}\r\nContent-Length: 6\r\n\r\nhello\n"),
    )
    .await;

    let head_resp = send(
        server.port,
        "HEAD /sln/file/sha256/5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03 HTTP/1.1\r\nHost: x\r\n\r\n",
    )
    .await;
    assert_eq!(status_line(&head_resp), "HTTP/1.1 200 OK");
    assert_eq!(header(&head_resp, "Content-Length").as_deref(), Some("0"));
    assert_eq!(body(&head_resp), "");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let (server, _dir) = TestServer::start_public_read().await;
    let resp = send(server.port, "GET /sln/nope HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(status_line(&resp), "HTTP/1.1 404 Not Found");
}

#[tokio::test]
async fn oversized_auth_body_is_rejected() {
    let (server, _dir) = TestServer::start_public_read().await;
    let oversized = "x".repeat(2000);
    let resp = send(
        server.port,
        &format!("POST /sln/auth HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}", oversized.len(), oversized),
    )
    .await;
    assert_eq!(status_line(&resp), "HTTP/1.1 400 Bad Request");
}

#[tokio::test]
async fn chunked_query_response_ends_with_zero_length_chunk() {
    let (server, _dir) = TestServer::start_public_read().await;
    let resp = send(server.port, "GET /sln/query?q=* HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(status_line(&resp), "HTTP/1.1 200 OK");
    assert_eq!(header(&resp, "Transfer-Encoding").as_deref(), Some("chunked"));
    assert_eq!(header(&resp, "Cache-Control").as_deref(), Some("no-store"));
    assert_eq!(header(&resp, "Vary").as_deref(), Some("*"));
    assert!(resp.ends_with("0\r\n\r\n"));
}
