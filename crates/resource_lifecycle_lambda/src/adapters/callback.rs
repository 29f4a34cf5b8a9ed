use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

use super::block_on;

/// A fully prepared callback delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub content_type: String,
    pub content_length: usize,
    pub body: Vec<u8>,
}

pub trait CallbackTransport {
    fn put(&self, request: &CallbackRequest) -> Result<(), String>;
}

impl<T: CallbackTransport + ?Sized> CallbackTransport for &T {
    fn put(&self, request: &CallbackRequest) -> Result<(), String> {
        (**self).put(request)
    }
}

/// Delivers callbacks to pre-signed URLs with a single HTTP PUT.
#[derive(Debug, Clone, Default)]
pub struct HttpCallbackTransport {
    client: reqwest::Client,
}

impl HttpCallbackTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl CallbackTransport for HttpCallbackTransport {
    fn put(&self, request: &CallbackRequest) -> Result<(), String> {
        block_on(async {
            let response = self
                .client
                .put(&request.url)
                .header(CONTENT_TYPE, &request.content_type)
                .header(CONTENT_LENGTH, request.content_length)
                .body(request.body.clone())
                .send()
                .await
                .map_err(|error| format!("failed to deliver callback response: {error}"))?;

            let status = response.status();
            if !status.is_success() {
                return Err(format!(
                    "callback endpoint rejected response with status {status}"
                ));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_endpoint_is_reported_as_error() {
        let transport = HttpCallbackTransport::default();
        let request = CallbackRequest {
            url: "http://127.0.0.1:1/callback".to_string(),
            content_type: String::new(),
            content_length: 2,
            body: b"{}".to_vec(),
        };

        let error = transport.put(&request).expect_err("nothing listens on port 1");

        assert!(error.starts_with("failed to deliver callback response"));
    }
}
