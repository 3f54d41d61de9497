//! Deterministic request keys.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// The URL must already be normalized. `vary` carries the values of any
/// headers the response varies on and is empty otherwise.
pub fn compute_request_key(method: &str, url: &str, vary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let a = compute_request_key("GET", "https://example.com/img/logo.png", "");
        let b = compute_request_key("GET", "https://example.com/img/logo.png", "");
        assert_eq!(a, b);
    }

    #[test]
    fn test_method_case_insensitive() {
        assert_eq!(
            compute_request_key("get", "https://example.com/", ""),
            compute_request_key("GET", "https://example.com/", "")
        );
    }

    #[test]
    fn test_key_differs_by_method_and_vary() {
        let get = compute_request_key("GET", "https://example.com/task", "");
        let head = compute_request_key("HEAD", "https://example.com/task", "");
        let gzip = compute_request_key("GET", "https://example.com/task", "gzip");
        assert_ne!(get, head);
        assert_ne!(get, gzip);
    }

    #[test]
    fn test_key_format() {
        let key = compute_request_key("GET", "https://example.com", "");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
