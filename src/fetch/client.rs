use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport used for every upstream feed request.
///
/// Implementations only execute the request; status handling and body
/// collection live in [`fetch_bytes`](super::fetch_bytes). Wrappers such as
/// [`ApiKey`](super::auth::ApiKey) decorate the request before delegating.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl HttpClient for Box<dyn HttpClient> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}
