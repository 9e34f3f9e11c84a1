//! HTTP drawing-server backend

use crate::providers::{backend_failed, request_failed};
use crate::{RenderBackend, RenderRequest};
use async_trait::async_trait;
use molviz_core::{MolvizError, MolvizResult, RemoteRenderConfig, RenderError};
use molviz_match::parse_structure;
use reqwest::Client;
use std::time::Duration;

const BACKEND: &str = "remote";

/// Posts form-encoded render requests to a drawing server.
///
/// Structures are checked with the local SMILES reader first; unparseable ones
/// fail with [`RenderError::InvalidStructure`] without touching the network.
pub struct RemoteRenderer {
    client: Client,
    endpoint: String,
    password: Option<String>,
    timeout: Duration,
}

impl RemoteRenderer {
    /// Create a renderer for `endpoint` with a 10 second request timeout.
    pub fn new(endpoint: impl Into<String>) -> MolvizResult<Self> {
        Self::with_options(endpoint, None, Duration::from_secs(10))
    }

    pub fn from_config(config: &RemoteRenderConfig) -> MolvizResult<Self> {
        Self::with_options(
            config.endpoint.clone(),
            config.password.clone(),
            config.timeout,
        )
    }

    pub fn with_options(
        endpoint: impl Into<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> MolvizResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| backend_failed(BACKEND, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            password,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Form fields sent for `request`. `fragSmiles` is only present when there
    /// is a highlight, `password` only when one is configured.
    pub fn form_fields(&self, request: &RenderRequest) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(6);
        if let Some(password) = &self.password {
            fields.push(("password", password.clone()));
        }
        fields.push(("molSmiles", request.structure.clone()));
        if let Some(highlight) = &request.highlight {
            fields.push(("fragSmiles", highlight.clone()));
        }
        fields.push(("size", request.size.to_string()));
        fields.push(("title", request.title.clone()));
        fields.push((
            "grayBack",
            if request.grayed_background { "True" } else { "False" }.to_string(),
        ));
        fields
    }

    fn transport_error(&self, err: reqwest::Error) -> MolvizError {
        if err.is_timeout() {
            MolvizError::Render(RenderError::Timeout {
                backend: BACKEND.to_string(),
                timeout: self.timeout,
            })
        } else {
            request_failed(BACKEND, 0, format!("HTTP request failed: {}", err))
        }
    }
}

#[async_trait]
impl RenderBackend for RemoteRenderer {
    async fn render(&self, request: &RenderRequest) -> MolvizResult<Vec<u8>> {
        if parse_structure(&request.structure).is_err() {
            return Err(MolvizError::Render(RenderError::InvalidStructure {
                structure: request.structure.clone(),
            }));
        }

        tracing::debug!(endpoint = %self.endpoint, structure = %request.structure, "Requesting remote rendering");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&self.form_fields(request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(request_failed(BACKEND, status.as_u16(), error_text));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(body.to_vec())
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

impl std::fmt::Debug for RemoteRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRenderer")
            .field("endpoint", &self.endpoint)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molviz_core::CacheKey;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP exchange, returning the request body that was received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.expect("read");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\nContent-Type: image/svg+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();

            let text = String::from_utf8_lossy(&buf).to_string();
            text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
        });

        (format!("http://{}/drawMol", addr), handle)
    }

    fn request() -> RenderRequest {
        RenderRequest::from(
            &CacheKey::new("c1ccccc1O", 150)
                .with_highlight("c1ccccc1")
                .with_title("phenol")
                .with_grayed_background(true),
        )
    }

    #[test]
    fn test_form_fields() {
        let renderer = RemoteRenderer::with_options(
            "http://127.0.0.1:9/drawMol",
            Some("s3cret".to_string()),
            Duration::from_secs(1),
        )
        .expect("client");

        let fields = renderer.form_fields(&request());
        assert_eq!(
            fields,
            vec![
                ("password", "s3cret".to_string()),
                ("molSmiles", "c1ccccc1O".to_string()),
                ("fragSmiles", "c1ccccc1".to_string()),
                ("size", "150".to_string()),
                ("title", "phenol".to_string()),
                ("grayBack", "True".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_fields_without_highlight_or_password() {
        let renderer = RemoteRenderer::new("http://127.0.0.1:9/drawMol").expect("client");
        let fields = renderer.form_fields(&RenderRequest::from(&CacheKey::new("CCO", 200)));
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["molSmiles", "size", "title", "grayBack"]);
    }

    #[test]
    fn test_debug_redacts_password() {
        let renderer = RemoteRenderer::with_options(
            "http://127.0.0.1:9/drawMol",
            Some("s3cret".to_string()),
            Duration::from_secs(1),
        )
        .expect("client");
        let debug = format!("{:?}", renderer);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn test_invalid_structure_skips_network() {
        // Nothing listens on the discard port; an attempted request would fail differently.
        let renderer = RemoteRenderer::new("http://127.0.0.1:9/drawMol").expect("client");
        let mut bad = request();
        bad.structure = "C1CC(".to_string();

        let err = renderer.render(&bad).await.expect_err("invalid structure");
        assert_eq!(
            err,
            MolvizError::Render(RenderError::InvalidStructure {
                structure: "C1CC(".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let renderer = RemoteRenderer::with_options(
            "http://127.0.0.1:9/drawMol",
            None,
            Duration::from_secs(2),
        )
        .expect("client");

        let err = renderer.render(&request()).await.expect_err("nothing listening");
        assert!(matches!(
            err,
            MolvizError::Render(RenderError::RequestFailed { status: 0, .. })
                | MolvizError::Render(RenderError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_successful_render_posts_form() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", "<svg>phenol</svg>").await;
        let renderer = RemoteRenderer::with_options(
            endpoint,
            Some("pw".to_string()),
            Duration::from_secs(5),
        )
        .expect("client");

        let bytes = renderer.render(&request()).await.expect("render");
        assert_eq!(bytes, b"<svg>phenol</svg>");

        let body = server.await.expect("server task");
        assert!(body.contains("password=pw"));
        assert!(body.contains("molSmiles=c1ccccc1O"));
        assert!(body.contains("fragSmiles=c1ccccc1"));
        assert!(body.contains("size=150"));
        assert!(body.contains("grayBack=True"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_request_failed() {
        let (endpoint, server) = serve_once("HTTP/1.1 500 Internal Server Error", "boom").await;
        let renderer = RemoteRenderer::new(endpoint).expect("client");

        let err = renderer.render(&request()).await.expect_err("server error");
        assert_eq!(
            err,
            MolvizError::Render(RenderError::RequestFailed {
                backend: "remote".to_string(),
                status: 500,
                message: "boom".to_string(),
            })
        );
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut chunk = [0u8; 1024];
            let _ = socket.read(&mut chunk).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let renderer = RemoteRenderer::with_options(
            format!("http://{}/drawMol", addr),
            None,
            Duration::from_millis(200),
        )
        .expect("client");

        let err = renderer.render(&request()).await.expect_err("no response");
        assert_eq!(
            err,
            MolvizError::Render(RenderError::Timeout {
                backend: "remote".to_string(),
                timeout: Duration::from_millis(200),
            })
        );
        server.abort();
    }
}
