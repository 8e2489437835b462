use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// The console wraps the registration in `installed` (desktop apps) or `web`.
#[derive(Debug, Deserialize)]
struct SecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

pub fn parse_client_secret(s: &str) -> Result<ClientSecret> {
    let file: SecretFile = serde_json::from_str(s)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| anyhow!("credentials file has neither an 'installed' nor a 'web' section"))
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading OAuth client file {}", path.display()))?;
    parse_client_secret(&s).with_context(|| format!("parsing {}", path.display()))
}
