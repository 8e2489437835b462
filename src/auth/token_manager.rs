use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::client_secret::{ClientSecret, load_client_secret};
use crate::auth::oauth::{self, GMAIL_MODIFY_SCOPE, Tokens};
use crate::auth::token_cache::{self, Credential};
use crate::config::Config;

/// Fallback lifetime when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3500;

/// The two ways of minting a fresh access token.
pub trait Authorizer {
    fn refresh(&self, refresh_token: &str) -> Result<Tokens>;
    fn authorize(&self) -> Result<Tokens>;
}

/// Google OAuth endpoints via the installed-app client registration.
pub struct GoogleAuthorizer {
    secret: ClientSecret,
    redirect_uri: String,
}

impl GoogleAuthorizer {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            secret: load_client_secret(&cfg.gmail.credentials_file)?,
            redirect_uri: cfg.redirect_uri().to_string(),
        })
    }
}

impl Authorizer for GoogleAuthorizer {
    fn refresh(&self, refresh_token: &str) -> Result<Tokens> {
        oauth::refresh_access_token(&self.secret, refresh_token)
    }

    fn authorize(&self) -> Result<Tokens> {
        oauth::perform_pkce_flow(&self.secret, &self.redirect_uri, GMAIL_MODIFY_SCOPE)
    }
}

pub struct TokenManager<A> {
    authorizer: A,
    token_file: PathBuf,
}

impl TokenManager<GoogleAuthorizer> {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            GoogleAuthorizer::from_config(cfg)?,
            cfg.gmail.token_file.clone(),
        ))
    }
}

impl<A: Authorizer> TokenManager<A> {
    pub fn new(authorizer: A, token_file: PathBuf) -> Self {
        Self {
            authorizer,
            token_file,
        }
    }

    /// Returns a valid credential; refreshes or runs interactive consent if needed.
    pub fn obtain_credential(&self) -> Result<Credential> {
        let now = now_epoch()?;

        let cached = match token_cache::load_credential(&self.token_file) {
            Ok(c) => c,
            Err(e) => {
                warn!("ignoring unreadable token cache: {e:#}");
                None
            }
        };

        // 1) cached & not expired
        if let Some(cred) = &cached {
            if cred.is_valid(now) {
                debug!("using cached access token");
                return Ok(cred.clone());
            }
        }

        // 2) refresh if possible
        if let Some(rt) = cached.as_ref().and_then(|c| c.refresh_token.clone()) {
            if !rt.is_empty() {
                info!("cached token expired; refreshing");
                match self.authorizer.refresh(&rt) {
                    Ok(t) => return self.persist(t, Some(rt), now),
                    Err(e) => warn!("refresh failed, falling back to interactive auth: {e:#}"),
                }
            }
        }

        // 3) otherwise PKCE
        self.reauthorize_at(now)
    }

    /// Run interactive consent unconditionally and overwrite the cache.
    pub fn reauthorize(&self) -> Result<Credential> {
        self.reauthorize_at(now_epoch()?)
    }

    fn reauthorize_at(&self, now: i64) -> Result<Credential> {
        info!("no usable credential; running interactive authorization");
        let t = self.authorizer.authorize()?;
        self.persist(t, None, now)
    }

    fn persist(&self, t: Tokens, previous_refresh: Option<String>, now: i64) -> Result<Credential> {
        let exp = now + t.expires_in.unwrap_or(DEFAULT_EXPIRES_IN) as i64;
        // Google usually omits the refresh token on refresh; keep the old one.
        let refresh = t.refresh_token.or(previous_refresh);
        let cred = Credential::new(t.access_token, refresh, Some(exp));
        token_cache::save_credential(&self.token_file, &cred)?;
        debug!("saved credential, expires at epoch {exp}");
        Ok(cred)
    }
}

fn now_epoch() -> Result<i64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow!("system clock before unix epoch: {e}"))?
        .as_secs() as i64)
}
