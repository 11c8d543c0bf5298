use crate::env_file::EnvFile;
use crate::error::{AuthError, StoreError};
use crate::models::{Credentials, TokenState};
use std::path::Path;

pub const CLIENT_ID: &str = "CLIENT_ID";
pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const AUTH_CODE: &str = "AUTH_CODE";
pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";

/// Current tokens, mirrored to the settings file on every change.
#[derive(Debug)]
pub struct TokenStore {
    state: TokenState,
    file: EnvFile,
}

impl TokenStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_file(EnvFile::load(path)?))
    }

    pub fn from_file(file: EnvFile) -> Self {
        let state = TokenState {
            access_token: file.get(ACCESS_TOKEN).map(String::from),
            refresh_token: file.get(REFRESH_TOKEN).map(String::from),
            auth_code: file.get(AUTH_CODE).map(String::from),
        };
        Self { state, file }
    }

    /// Client credentials from the settings file, falling back to the
    /// process environment.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        self.credentials_from(|key| std::env::var(key).ok())
    }

    /// Like [`credentials`](Self::credentials) with `env` standing in for
    /// the process environment.
    pub fn credentials_from<F>(&self, env: F) -> Result<Credentials, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            self.file
                .get(key)
                .map(String::from)
                .or_else(|| env(key).filter(|v| !v.is_empty()))
        };
        match (lookup(CLIENT_ID), lookup(CLIENT_SECRET)) {
            (Some(client_id), Some(client_secret)) => Ok(Credentials {
                client_id,
                client_secret,
            }),
            _ => Err(AuthError::MissingCredentials),
        }
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn access_token(&self) -> Option<&str> {
        self.state.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.state.refresh_token.as_deref()
    }

    pub fn auth_code(&self) -> Option<&str> {
        self.state.auth_code.as_deref()
    }

    pub fn set_access_token(&mut self, token: &str) -> Result<(), StoreError> {
        self.file.set(ACCESS_TOKEN, token)?;
        self.state.access_token = Some(token.to_string());
        Ok(())
    }

    pub fn set_refresh_token(&mut self, token: &str) -> Result<(), StoreError> {
        self.file.set(REFRESH_TOKEN, token)?;
        self.state.refresh_token = Some(token.to_string());
        Ok(())
    }

    pub fn set_auth_code(&mut self, code: &str) -> Result<(), StoreError> {
        self.file.set(AUTH_CODE, code)?;
        self.state.auth_code = Some(code.to_string());
        Ok(())
    }
}
