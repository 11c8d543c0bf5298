use thiserror::Error;

/// Failures of the settings file that holds credentials and tokens.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that stops us from holding a usable access token.
///
/// These are fatal for the run; the next run starts the authorization
/// flow again.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("CLIENT_ID and CLIENT_SECRET must be set")]
    MissingCredentials,
    #[error("not authorized yet: no access token held")]
    NotAuthorized,
    #[error("no refresh token held")]
    MissingRefreshToken,
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    #[error("access token rejected again after refresh")]
    Unauthorized,
    #[error("no authorization code in input")]
    MissingCode,
    #[error("authorization state mismatch")]
    StateMismatch,
    #[error("invalid authorization url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("token request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A resource request that did not produce a usable response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to {url} failed: {status} => {body}")]
    Status { status: u16, url: String, body: String },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Cache backend failures. Callers treat these as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache backend: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("cache pool: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("cache task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Error type of every fetch operation.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl FetchError {
    /// True when the failure came from the authorization flow.
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }
}
