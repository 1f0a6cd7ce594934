use anyhow::Result;
use async_trait::async_trait;
use listcore::net::{HttpClient, HttpRequest, HttpResponse};

/// Largest response body read into memory.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// [`HttpClient`] backed by the blocking `ureq` agent.
///
/// Each request runs on tokio's blocking pool, so callers must be inside a
/// tokio runtime.
#[derive(Clone)]
pub struct UreqHttpClient {
    agent: ureq::Agent,
}

impl std::fmt::Debug for UreqHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqHttpClient").finish_non_exhaustive()
    }
}

impl UreqHttpClient {
    pub fn new() -> Self {
        Self::with_agent(ureq::Agent::new_with_defaults())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || {
            let mut req = agent.get(&request.url);
            for (key, value) in &request.headers {
                req = req.header(key, value);
            }
            // Non-2xx statuses are data for the image pipeline, not transport errors.
            let response = req.config().http_status_as_error(false).build().call()?;

            let status_code = response.status().as_u16();
            let mut body = response.into_body();
            let body = body.with_config().limit(MAX_BODY_BYTES).read_to_vec()?;

            Ok(HttpResponse { status_code, body })
        })
        .await?
    }
}
