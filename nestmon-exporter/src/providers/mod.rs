//! Upstream providers rendered by the exporter.

pub mod nest;
pub mod openweather;

pub use nest::NestSource;
pub use openweather::OpenWeatherSource;

use std::time::Duration;

use url::Url;

use crate::source::SourceError;

/// Build an HTTP client with a fixed per-call timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("nestmon-exporter/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Send a request and return the body of a successful response.
///
/// The body is read even for failed responses so it can be reported.
pub(crate) async fn get_text(
    request: reqwest::RequestBuilder,
    dependency: &str,
) -> Result<String, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::transport(dependency, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::transport(dependency, e))?;

    if !status.is_success() {
        return Err(SourceError::status(dependency, status.as_u16(), body));
    }

    Ok(body)
}

/// Append path segments to a base URL, percent-encoding each segment.
///
/// A trailing empty segment of the base (`http://host/`) is replaced, so the
/// slash is never doubled. Bases that cannot carry a path are returned as is;
/// configuration only admits http(s) URLs.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
