//! HTTP(S) prober.

use std::time::Duration;

/// Request timeout for status checks.
const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP GET prober for one URL. Alive iff the status is 200.
#[derive(Debug)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: &str) -> Self {
        Self::with_timeout(url, HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.url
    }

    pub async fn is_alive(&self) -> (bool, String) {
        let detail = self.get_status().await;
        (detail == "200", detail)
    }

    /// GET the URL and describe the outcome: the numeric status code, or a
    /// fixed string for timeouts and connection failures.
    pub async fn get_status(&self) -> String {
        let client = match reqwest::Client::builder().timeout(self.timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("failed to build http client: {}", e);
                return "Failed to establish a new connection".to_string();
            }
        };

        match client.get(&self.url).send().await {
            Ok(response) => response.status().as_u16().to_string(),
            Err(e) if e.is_timeout() => "Timeout".to_string(),
            Err(_) => "Failed to establish a new connection".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused() {
        // Nothing listens on this port; connect fails immediately.
        let probe = HttpProbe::with_timeout("http://127.0.0.1:1", Duration::from_millis(500));
        let (alive, detail) = probe.is_alive().await;
        assert!(!alive);
        assert_eq!(detail, "Failed to establish a new connection");
    }

    #[tokio::test]
    async fn test_status_200_is_alive() {
        // Serve exactly one canned response on an ephemeral local port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let _ = stream.read(&mut [0u8; 1024]).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                .await;
        });

        let probe = HttpProbe::new(&format!("http://{}", addr));
        let (alive, detail) = probe.is_alive().await;
        assert!(alive);
        assert_eq!(detail, "200");
    }

    #[tokio::test]
    async fn test_non_200_status_is_down() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let _ = stream.read(&mut [0u8; 1024]).await;
            let _ = stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n")
                .await;
        });

        let probe = HttpProbe::new(&format!("http://{}", addr));
        let (alive, detail) = probe.is_alive().await;
        assert!(!alive);
        assert_eq!(detail, "503");
    }
}
