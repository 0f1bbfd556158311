//! Blocking HTTP transport.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use tracing::debug;

use crate::capabilities::{HttpMethod, HttpRequest, Transport};
use crate::error::{ConformanceError, ConformanceResult};
use crate::response::ServerResponse;

/// [`Transport`] over `reqwest`'s blocking client.
///
/// Redirects are not followed and error statuses are returned as ordinary
/// responses.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    /// Returns [`ConformanceError::Config`] if the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Duration) -> ConformanceResult<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ConformanceError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn failure(url: &str, err: &reqwest::Error) -> ConformanceError {
        ConformanceError::TransportFailure {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> ConformanceResult<ServerResponse> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/cbor")
                .body(request.body.clone()),
        };
        let response = builder
            .send()
            .map_err(|e| Self::failure(&request.url, &e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response
            .bytes()
            .map_err(|e| Self::failure(&request.url, &e))?;
        debug!(method = %request.method, url = %url, status, body_len = body.len(), "http exchange");
        Ok(ServerResponse::new(status, body.to_vec(), url))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Serve one connection with `reply` and return the raw request text.
    fn serve_once(reply: &'static [u8]) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || complete(&request) {
                    break;
                }
            }
            stream.write_all(reply).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= head_end + 4 + length
    }

    #[test]
    fn post_sends_body_and_returns_response() {
        let (base, server) =
            serve_once(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\nIFT ");
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(&HttpRequest::post(format!("{base}/font"), vec![0xA0]))
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), b"IFT ");
        assert!(response.url().ends_with("/font"));
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /font HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/cbor"));
    }

    #[test]
    fn error_status_is_not_an_error() {
        let (base, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        );
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(&HttpRequest::get(format!("{base}/notfound")))
            .unwrap();
        assert_eq!(response.status(), 404);
        assert!(server.join().unwrap().starts_with("GET /notfound"));
    }

    #[test]
    fn redirects_are_not_followed() {
        let (base, server) = serve_once(
            b"HTTP/1.1 302 Found\r\nlocation: /elsewhere\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        );
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport.send(&HttpRequest::get(format!("{base}/font"))).unwrap();
        assert_eq!(response.status(), 302);
        server.join().unwrap();
    }

    #[test]
    fn connection_refused_is_transport_failure() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
        let err = transport
            .send(&HttpRequest::get(format!("http://{addr}/font")))
            .unwrap_err();
        assert!(matches!(err, ConformanceError::TransportFailure { .. }));
    }
}
