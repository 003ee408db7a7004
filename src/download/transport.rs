//! Network transport
//!
//! The orchestrator talks to repositories through the [`Transport`] trait so
//! the fallback and single-flight logic can be exercised without a network.

use crate::config::schema::DownloadConfig;
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::Credentials;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use tracing::debug;

/// Fetches the bytes behind a URL
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url`. Any non-2xx answer is an [`PlugdepsError::HttpStatus`].
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> PlugdepsResult<Vec<u8>>;
}

/// Blocking HTTP client run on the blocking thread pool
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    user_agent: String,
    max_bytes: u64,
}

impl HttpTransport {
    pub fn new(settings: &DownloadConfig) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.attempt_timeout_secs)))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            user_agent: settings.user_agent.clone(),
            max_bytes: settings.max_artifact_bytes,
        }
    }

    fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> PlugdepsResult<Vec<u8>> {
        let mut request = self.agent.get(url).header("User-Agent", &self.user_agent);
        if let Some(creds) = credentials {
            let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
            request = request.header("Authorization", format!("Basic {}", token));
        }

        let mut response = request.call().map_err(|e| classify(url, e))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(PlugdepsError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        response
            .body_mut()
            .with_config()
            .limit(self.max_bytes)
            .read_to_vec()
            .map_err(|e| match e {
                ureq::Error::BodyExceedsLimit(_) => PlugdepsError::ArtifactTooLarge {
                    url: url.to_string(),
                    limit: self.max_bytes,
                },
                other => classify(url, other),
            })
    }
}

fn classify(url: &str, error: ureq::Error) -> PlugdepsError {
    match error {
        ureq::Error::Timeout(_) => PlugdepsError::AttemptTimeout {
            url: url.to_string(),
        },
        other => PlugdepsError::RepositoryUnreachable {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, credentials: Option<&Credentials>) -> PlugdepsResult<Vec<u8>> {
        debug!("GET {}", url);
        let this = self.clone();
        let url_owned = url.to_string();
        let credentials = credentials.cloned();

        tokio::task::spawn_blocking(move || this.fetch(&url_owned, credentials.as_ref()))
            .await
            .map_err(|e| PlugdepsError::Internal(format!("download task failed: {}", e)))?
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP server answering `responses.len()` connections in order
    fn serve(responses: Vec<(u16, &'static [u8])>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let head = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(body).unwrap();
                stream.flush().unwrap();
            }
        });

        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn http_transport_fetches_and_maps_status() {
        let base = serve(vec![(200, b"jar-bytes"), (404, b"")]);
        let transport = HttpTransport::new(&DownloadConfig::default());

        let body = transport.get(&format!("{}a.jar", base), None).await.unwrap();
        assert_eq!(body, b"jar-bytes");

        let err = transport
            .get(&format!("{}missing.jar", base), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlugdepsError::HttpStatus { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn http_transport_enforces_size_limit() {
        let base = serve(vec![(200, b"0123456789")]);
        let settings = DownloadConfig {
            max_artifact_bytes: 4,
            ..DownloadConfig::default()
        };
        let transport = HttpTransport::new(&settings);

        let err = transport.get(&format!("{}big.jar", base), None).await.unwrap_err();
        assert!(matches!(err, PlugdepsError::ArtifactTooLarge { limit: 4, .. }));
    }
}
