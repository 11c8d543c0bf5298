use crate::config::Config;
use crate::error::AuthError;
use crate::models::{Credentials, TokenState};
use crate::tokens::TokenStore;
use base64::{engine::general_purpose, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Where the authorization-code flow currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCode,
    HaveCode,
    HaveTokens,
    Refreshing,
    TerminalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Refreshing,
    Failed,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// OAuth client for the authorization-code flow.
///
/// Owns the token store. A refresh token obtained by the first exchange is
/// kept for the lifetime of the settings file; later exchanges and refreshes
/// never replace it.
pub struct AuthClient {
    client: Client,
    credentials: Credentials,
    auth_base: String,
    redirect_uri: String,
    scopes: Vec<String>,
    store: Mutex<TokenStore>,
    phase: Mutex<Phase>,
}

impl AuthClient {
    pub fn new(client: Client, cfg: &Config, store: TokenStore) -> Result<Self, AuthError> {
        let credentials = store.credentials()?;
        Ok(Self {
            client,
            credentials,
            auth_base: cfg.auth_base.trim_end_matches('/').to_string(),
            redirect_uri: cfg.redirect_uri.clone(),
            scopes: cfg.scopes.clone(),
            store: Mutex::new(store),
            phase: Mutex::new(Phase::Idle),
        })
    }

    pub async fn state(&self) -> AuthState {
        match *self.phase.lock().await {
            Phase::Failed => return AuthState::TerminalFailure,
            Phase::Refreshing => return AuthState::Refreshing,
            Phase::Idle => {}
        }
        let store = self.store.lock().await;
        if store.refresh_token().is_some() || store.access_token().is_some() {
            AuthState::HaveTokens
        } else if store.auth_code().is_some() {
            AuthState::HaveCode
        } else {
            AuthState::NoCode
        }
    }

    pub async fn token_state(&self) -> TokenState {
        self.store.lock().await.state().clone()
    }

    pub async fn auth_code(&self) -> Option<String> {
        self.store.lock().await.auth_code().map(String::from)
    }

    pub async fn access_token(&self) -> Result<String, AuthError> {
        self.store
            .lock()
            .await
            .access_token()
            .map(String::from)
            .ok_or(AuthError::NotAuthorized)
    }

    /// Token to present on the next request. A session resumed with only a
    /// refresh token trades it for an access token first.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        let held = {
            let store = self.store.lock().await;
            (store.access_token().map(String::from), store.refresh_token().is_some())
        };
        match held {
            (Some(token), _) => Ok(token),
            (None, true) => {
                info!("no access token held; refreshing before first request");
                self.refresh().await
            }
            (None, false) => Err(AuthError::NotAuthorized),
        }
    }

    /// URL the user opens to grant access. `state` is echoed back on the
    /// redirect.
    pub fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        let mut url = Url::parse(&format!("{}/authorize", self.auth_base))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    /// Persist the code pasted by the user. Accepts the bare code or the
    /// full redirect URL.
    pub async fn store_auth_code(
        &self,
        input: &str,
        expected_state: &str,
    ) -> Result<String, AuthError> {
        let code = extract_code(input, expected_state)?;
        self.store.lock().await.set_auth_code(&code)?;
        info!("authorization code stored");
        Ok(code)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenState, AuthError> {
        info!("Retrieving token...");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let tr = self.token_request(&params).await?;

        let mut store = self.store.lock().await;
        store.set_access_token(&tr.access_token)?;
        let holds_refresh = store.refresh_token().is_some();
        match tr.refresh_token {
            Some(rt) if !holds_refresh => store.set_refresh_token(&rt)?,
            Some(_) => debug!("refresh token already held; keeping it"),
            None => warn!("token exchange returned no refresh token"),
        }
        *self.phase.lock().await = Phase::Idle;
        Ok(store.state().clone())
    }

    /// Trade the held refresh token for a new access token. Any failure
    /// here is terminal for the run.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        *self.phase.lock().await = Phase::Refreshing;
        let res = self.refresh_inner().await;
        *self.phase.lock().await = match &res {
            Ok(_) => Phase::Idle,
            Err(e) => {
                warn!("token refresh failed: {}", e);
                Phase::Failed
            }
        };
        res
    }

    async fn refresh_inner(&self) -> Result<String, AuthError> {
        let refresh_token = self
            .store
            .lock()
            .await
            .refresh_token()
            .map(String::from)
            .ok_or(AuthError::MissingRefreshToken)?;
        debug!("refreshing access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let tr = self.token_request(&params).await?;
        if tr.refresh_token.is_some() {
            debug!("token endpoint sent a new refresh token; keeping the stored one");
        }
        self.store.lock().await.set_access_token(&tr.access_token)?;
        info!("access token refreshed");
        Ok(tr.access_token)
    }

    /// Mark the flow as dead after the API keeps rejecting fresh tokens.
    pub async fn mark_failed(&self) {
        *self.phase.lock().await = Phase::Failed;
    }

    fn basic_auth(&self) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.credentials.client_id, self.credentials.client_secret
            ))
        )
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let url = format!("{}/api/token", self.auth_base);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.basic_auth())
            .form(params)
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.text().await.map_err(AuthError::Transport)?;
        serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }
}

/// Random value for the `state` parameter of the authorize URL.
pub fn new_state_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

fn extract_code(input: &str, expected_state: &str) -> Result<String, AuthError> {
    let input = input.trim();
    let parsed = match Url::parse(input) {
        Ok(u) => u,
        Err(_) if input.is_empty() => return Err(AuthError::MissingCode),
        Err(_) => return Ok(input.to_string()),
    };
    let mut code = None;
    for (k, v) in parsed.query_pairs() {
        match &*k {
            "code" => code = Some(v.into_owned()),
            "state" if v != expected_state => return Err(AuthError::StateMismatch),
            _ => {}
        }
    }
    code.filter(|c| !c.is_empty()).ok_or(AuthError::MissingCode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_code_is_taken_verbatim() {
        assert_eq!(extract_code("  AQBx123 \n", "s").unwrap(), "AQBx123");
    }

    #[test]
    fn code_is_read_from_redirect_url() {
        let code = extract_code("https://spotify.com/?code=abc&state=s1", "s1").unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn foreign_state_is_rejected() {
        let err = extract_code("https://spotify.com/?code=abc&state=other", "s1").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn redirect_without_code_is_rejected() {
        let err = extract_code("https://spotify.com/?error=access_denied", "s1").unwrap_err();
        assert!(matches!(err, AuthError::MissingCode));
        assert!(matches!(extract_code("   ", "s1").unwrap_err(), AuthError::MissingCode));
    }

    #[test]
    fn nonce_is_alphanumeric() {
        let n = new_state_nonce();
        assert_eq!(n.len(), 16);
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
