//! A server's answer to one request, decoded at most once.

use std::cell::OnceCell;

use ift_wire::{DecodedResponse, WireError};

/// Status, body and URL of one HTTP exchange.
///
/// The body is decoded on first access to [`ServerResponse::decoded`] and the
/// result (including a failure) is kept for every later call.
#[derive(Debug, Clone)]
pub struct ServerResponse {
    status: u16,
    body: Vec<u8>,
    url: String,
    decoded: OnceCell<Result<DecodedResponse, WireError>>,
}

impl ServerResponse {
    /// Wrap a received response.
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>, url: impl Into<String>) -> Self {
        Self {
            status,
            body,
            url: url.into(),
            decoded: OnceCell::new(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// URL the response was received from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// The body decoded as a patch response.
    ///
    /// # Errors
    /// Returns the (cached) decode failure: bad magic, malformed CBOR or a
    /// top-level value that is not a map.
    pub fn decoded(&self) -> Result<&DecodedResponse, WireError> {
        self.decoded
            .get_or_init(|| DecodedResponse::from_body(&self.body))
            .as_ref()
            .map_err(Clone::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failure_is_memoized() {
        let response = ServerResponse::new(200, b"NOPE".to_vec(), "http://x/font");
        let first = response.decoded().unwrap_err();
        let second = response.decoded().unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, WireError::BadMagic { .. }));
    }

    #[test]
    fn client_error_range() {
        assert!(ServerResponse::new(400, vec![], "u").is_client_error());
        assert!(ServerResponse::new(499, vec![], "u").is_client_error());
        assert!(!ServerResponse::new(500, vec![], "u").is_client_error());
        assert!(!ServerResponse::new(200, vec![], "u").is_client_error());
    }
}
