use crate::api::spotify_auth::{new_state_nonce, AuthClient, AuthState};
use crate::error::FetchError;
use crate::finder::Finder;
use crate::models::TrackCandidate;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use tracing::{error, info};

/// The user-facing side of a run: questions in, text out.
pub trait Prompter {
    fn ask(&mut self, prompt: &str) -> Result<String>;

    fn say(&mut self, line: &str);

    /// Yes/no question; "Y" or "y" means yes.
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(self.ask(prompt)?.trim().eq_ignore_ascii_case("y"))
    }
}

/// Bring the auth flow to HAVE_TOKENS, asking the user for a code when
/// none is stored.
pub async fn authorize(auth: &AuthClient, prompter: &mut dyn Prompter) -> Result<()> {
    match auth.state().await {
        AuthState::HaveTokens | AuthState::Refreshing => Ok(()),
        AuthState::TerminalFailure => Err(anyhow!("authorization failed earlier in this run")),
        AuthState::HaveCode => {
            let code = auth
                .auth_code()
                .await
                .ok_or_else(|| anyhow!("stored authorization code vanished"))?;
            auth.exchange_code(&code)
                .await
                .context(
                    "exchanging stored AUTH_CODE; run `playlist-finder auth` to authorize again",
                )?;
            Ok(())
        }
        AuthState::NoCode => authorize_interactive(auth, prompter).await,
    }
}

/// Always run the browser flow: print the URL, read the code, exchange it.
pub async fn authorize_interactive(auth: &AuthClient, prompter: &mut dyn Prompter) -> Result<()> {
    let nonce = new_state_nonce();
    let url = auth.authorize_url(&nonce)?;
    prompter.say(&format!("Go to this URL to authorize the app: {}", url));
    let input = prompter.ask("Enter your Auth Code (or the full redirect URL) here: ")?;
    let code = auth.store_auth_code(&input, &nonce).await?;
    auth.exchange_code(&code).await.context("exchanging authorization code")?;
    prompter.say("Authorized. Tokens saved.");
    Ok(())
}

enum Step {
    AskSong,
    Confirm(TrackCandidate),
    Locate(String),
    AskRetry,
    Done,
}

/// Interactive loop: search, confirm, locate, offer another go.
pub async fn run_session(finder: &Finder, prompter: &mut dyn Prompter) -> Result<()> {
    authorize(finder.auth(), prompter).await?;
    let mut step = Step::AskSong;
    loop {
        step = match step {
            Step::AskSong => {
                let song = prompter.ask("Song: ")?;
                let artist = prompter.ask("Artist: ")?;
                prompter.say("Searching for song...");
                match finder.search(&song, &artist).await {
                    Ok(hits) => match hits.into_iter().next() {
                        Some(c) => Step::Confirm(c),
                        None => {
                            prompter.say("No tracks matched that search.");
                            Step::AskRetry
                        }
                    },
                    Err(e) => {
                        recoverable(e, prompter)?;
                        Step::AskRetry
                    }
                }
            }
            Step::Confirm(c) => {
                prompter.say(&format!("Song: {}", c.name));
                prompter.say(&format!("Album: {}", c.album));
                prompter.say(&format!("Artist: {}", c.artist));
                if prompter.confirm("Is this song correct? Please enter Y or N: ")? {
                    Step::Locate(c.name.to_lowercase())
                } else {
                    Step::AskSong
                }
            }
            Step::Locate(song) => {
                locate_and_report(finder, &song, prompter).await?;
                prompter.say("---+---+---+---");
                Step::AskRetry
            }
            Step::AskRetry => {
                if prompter.confirm("Would you like to try again? Please enter Y or N: ")? {
                    Step::AskSong
                } else {
                    Step::Done
                }
            }
            Step::Done => return Ok(()),
        };
    }
}

/// Locate `song` and print the result. Request failures are reported and
/// swallowed; auth failures end the run.
pub async fn locate_and_report(
    finder: &Finder,
    song: &str,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    match finder.locate(song).await {
        Ok(found) => {
            info!(song = %song, playlists = found.len(), "lookup finished");
            prompter.say(&describe(&found));
            Ok(())
        }
        Err(e) => recoverable(e, prompter),
    }
}

fn recoverable(e: FetchError, prompter: &mut dyn Prompter) -> Result<()> {
    if e.is_auth() {
        return Err(e).context("authorization lost; run `playlist-finder auth` to authorize again");
    }
    error!("request failed: {}", e);
    prompter.say(&format!("Unfortunately, an error was encountered: {}", e));
    Ok(())
}

pub fn describe(found: &BTreeSet<String>) -> String {
    if found.is_empty() {
        "This song was not located in any of your playlists.".to_string()
    } else {
        let names: Vec<&str> = found.iter().map(String::as_str).collect();
        format!(
            "This song is located in the following playlists:\n\n{}",
            names.join(", ")
        )
    }
}
