use super::spotify_auth::AuthClient;
use crate::error::{AuthError, FetchError, RequestError};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

/// Status the API uses for "nothing to return" (e.g. a search it cannot
/// satisfy). Treated as an empty result rather than a failure.
pub const EMPTY_RESULT_STATUS: StatusCode = StatusCode::BAD_REQUEST;

/// Runs authenticated requests, refreshing the access token once when the
/// API rejects it.
#[derive(Clone)]
pub struct ResilientExecutor {
    auth: Arc<AuthClient>,
}

impl ResilientExecutor {
    pub fn new(auth: Arc<AuthClient>) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    /// Send the request produced by `build` with the current bearer token.
    ///
    /// `build` may be called twice: a 401 triggers one refresh and one
    /// rebuilt attempt, and a second 401 is an `AuthError::Unauthorized`.
    /// Returns `Ok(None)` for `EMPTY_RESULT_STATUS`; any other non-2xx is a
    /// `RequestError::Status` and is not retried.
    pub async fn execute<F>(&self, build: F) -> Result<Option<Response>, FetchError>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.bearer_token().await?;
        let resp = send(build(&token)).await?;
        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("access token rejected by {}; refreshing", resp.url());
            let token = self.auth.refresh().await?;
            let retry = send(build(&token)).await?;
            if retry.status() == StatusCode::UNAUTHORIZED {
                self.auth.mark_failed().await;
                return Err(AuthError::Unauthorized.into());
            }
            retry
        } else {
            resp
        };
        Ok(classify(resp).await?)
    }
}

async fn send(req: RequestBuilder) -> Result<Response, RequestError> {
    req.send().await.map_err(RequestError::Transport)
}

async fn classify(resp: Response) -> Result<Option<Response>, RequestError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(Some(resp));
    }
    if status == EMPTY_RESULT_STATUS {
        debug!("{} returned {}; treating as empty", resp.url(), status);
        return Ok(None);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(RequestError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}
