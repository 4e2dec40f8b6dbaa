pub mod ca;
pub mod compute;
pub mod types;

use reqwest::{RequestBuilder, Response, StatusCode};

use crate::error::RotationError;

/// Attaches the configured bearer token, if any.
fn authorize(request: RequestBuilder, auth_token: Option<&str>) -> RequestBuilder {
    match auth_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Maps a non-success response to the matching error kind, draining the body
/// for the message. 404 becomes `NotFound`, everything else `RemoteApi`.
async fn check_response(response: Response, what: &str) -> Result<Response, RotationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(RotationError::NotFound(format!("{what}: {message}")));
    }
    Err(RotationError::RemoteApi {
        status: status.as_u16(),
        message: format!("{what}: {message}"),
    })
}
