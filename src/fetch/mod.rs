mod basic;
mod client;
pub mod auth;

pub use basic::{BasicClient, HttpConfig};
pub use client::HttpClient;

use bytes::Bytes;

use crate::error::FetchError;

/// Issues a single GET for `url` and returns the body of a 2xx response.
///
/// No retries are attempted; any non-success status is reported as
/// [`FetchError::Status`].
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FetchError> {
    let url = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    Ok(resp.bytes().await?)
}
