//! In-memory transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::{FetchError, Transport};

/// Serves canned bodies keyed by URL and records every request.
///
/// Unknown URLs answer 404. A URL registered with failures answers 503 that
/// many times before serving its body.
#[derive(Default)]
pub struct MockTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
        self
    }

    pub fn with_failures(self, url: &str, count: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), count);
        self
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let key = url.as_str().to_string();
        self.requests.lock().unwrap().push(key.clone());

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::HttpStatus {
                        status: 503,
                        message: "Service Unavailable".to_string(),
                    });
                }
            }
        }

        self.bodies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                message: "Not Found".to_string(),
            })
    }
}
