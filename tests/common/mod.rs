use std::sync::Arc;
use stronglink::Repository;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub port: u16,
    pub repo: Arc<Repository>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> (TestServer, tempfile::TempDir) {
        Self::start_with(false).await
    }

    pub async fn start_public_read() -> (TestServer, tempfile::TempDir) {
        Self::start_with(true).await
    }

    async fn start_with(public_read: bool) -> (TestServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let repo = Repository::in_memory_with_config(
            dir.path().join("tmp"),
            dir.path().join("data"),
            dir.path().join("cache"),
            public_read,
        );

        let port = free_port().await;
        let run_repo = repo.clone();
        let handle = tokio::spawn(async move {
            let _ = stronglink::http::server::run(run_repo, port, 5, 3600).await;
        });
        // Give the listener a moment to bind before the first connection.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        (TestServer { port, repo, handle }, dir)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Sends a raw HTTP/1.1 request and returns the full response text.
pub async fn send(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();

    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

pub fn header(response: &str, name: &str) -> Option<String> {
    response
        .lines()
        .skip(1)
        .take_while(|l| !l.is_empty())
        .find_map(|l| l.split_once(':').filter(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.trim().to_string()))
}

pub fn body(response: &str) -> String {
    match response.split_once("\r\n\r\n") {
        Some((_, b)) => b.to_string(),
        None => String::new(),
    }
}
