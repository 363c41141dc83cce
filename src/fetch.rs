//! Byte fetching for URL-sourced samples
//!
//! Thin wrapper over ureq that separates non-success HTTP statuses from
//! transport failures and caps the response size.

use std::io::Read;

/// Upper bound on a fetched sample's size.
const MAX_FETCH_BYTES: u64 = 100_000_000; // 100MB limit

/// Fetch raw sample bytes from `url`.
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    let response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => FetchError::Status(code),
        e => FetchError::Network(e.to_string()),
    })?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_FETCH_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| FetchError::Network(e.to_string()))?;

    Ok(bytes)
}

/// Failures reaching or reading the byte source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_a_network_error() {
        let result = fetch_bytes("not a url");
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
