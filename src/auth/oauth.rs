use anyhow::{Result, anyhow};
use log::{info, warn};
use oauth2::TokenResponse;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret as OAuthClientSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::client_secret::ClientSecret;

/// Read, search and relabel mail; enough to clear `UNREAD`.
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

const CONSENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Tokens returned by the oauth flow (in-memory)
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl From<BasicTokenResponse> for Tokens {
    fn from(token: BasicTokenResponse) -> Self {
        Self {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
            expires_in: token.expires_in().map(|d| d.as_secs()),
        }
    }
}

fn oauth_client(secret: &ClientSecret) -> Result<BasicClient> {
    let client_id = ClientId::new(secret.client_id.clone());
    let client_secret = secret
        .client_secret
        .as_ref()
        .map(|s| OAuthClientSecret::new(s.clone()));

    let auth_url = AuthUrl::new(secret.auth_uri.clone())?;
    let token_url = TokenUrl::new(secret.token_uri.clone())?;

    Ok(BasicClient::new(
        client_id,
        client_secret,
        auth_url,
        Some(token_url),
    ))
}

/// Exchange a refresh token for a new access token using the oauth2 crate
pub fn refresh_access_token(secret: &ClientSecret, refresh_token: &str) -> Result<Tokens> {
    let client = oauth_client(secret)?;
    let rt = RefreshToken::new(refresh_token.to_string());
    let token = client
        .exchange_refresh_token(&rt)
        .request(http_client)
        .map_err(|e| anyhow!("refresh token exchange failed: {e}"))?;
    Ok(token.into())
}

/// Perform Authorization Code + PKCE flow. Opens system browser and captures code via tiny server.
pub fn perform_pkce_flow(secret: &ClientSecret, redirect_uri: &str, scope: &str) -> Result<Tokens> {
    // Parse redirect_uri so bind address matches exactly
    let redirect = Url::parse(redirect_uri)
        .map_err(|e| anyhow!("Invalid redirect_uri '{redirect_uri}': {e}"))?;

    let host = redirect
        .host_str()
        .ok_or_else(|| anyhow!("redirect_uri missing host: {redirect_uri}"))?;

    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| anyhow!("redirect_uri missing/unknown port: {redirect_uri}"))?;

    let bind_ip: IpAddr = match host {
        "localhost" | "127.0.0.1" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other.parse::<IpAddr>().map_err(|_| {
            anyhow!("redirect_uri host must be localhost/127.0.0.1 or an IP: {other}")
        })?,
    };

    let bind_addr = SocketAddr::new(bind_ip, port);

    // Listen before the browser can redirect back.
    let server = Server::http(bind_addr)
        .map_err(|e| anyhow!("Failed to bind OAuth callback server on {bind_addr}: {e:?}"))?;

    let client = oauth_client(secret)?.set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (auth_url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(scope.to_string()))
        // Google only returns a refresh token on offline + consent.
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    info!("Open this URL in your browser to authorize mailbox access:\n{auth_url}");
    if let Err(e) = open::that(auth_url.as_str()) {
        warn!("could not open browser automatically: {e}");
    }

    let code = wait_for_code(&server, host, port, csrf_token.secret())?;

    let token = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request(http_client)
        .map_err(|e| anyhow!("Token exchange failed: {e:?}"))?;

    Ok(token.into())
}

fn wait_for_code(server: &Server, host: &str, port: u16, expected_state: &str) -> Result<String> {
    let wait_until = Instant::now() + CONSENT_TIMEOUT;

    while Instant::now() < wait_until {
        let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };

        let Some(request) = maybe_request else {
            continue;
        };

        // request.url() is a path+query like "/callback?code=...&state=..."
        let full = format!("http://{}:{}{}", host, port, request.url());

        match parse_callback(&full, expected_state) {
            Ok(Some(code)) => {
                let _ = request.respond(Response::from_string(
                    "Authorization received. You can close this tab.",
                ));
                return Ok(code);
            }
            Ok(None) => {
                let _ = request.respond(Response::from_string(
                    "No code found in redirect. You can close this tab.",
                ));
            }
            Err(e) => {
                let _ = request.respond(Response::from_string(format!("Bad redirect: {e}")));
            }
        }
    }

    Err(anyhow!("No code received within timeout"))
}

/// Pull the authorization code out of the redirect URL, checking the CSRF state.
fn parse_callback(full_url: &str, expected_state: &str) -> Result<Option<String>> {
    let parsed = Url::parse(full_url)?;
    let mut code = None;
    let mut state = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => return Err(anyhow!("authorization denied: {v}")),
            _ => {}
        }
    }
    if code.is_some() && state.as_deref() != Some(expected_state) {
        return Err(anyhow!("state mismatch in redirect"));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_with_matching_state_yields_code() {
        let code = parse_callback("http://127.0.0.1:8080/callback?code=abc&state=xyz", "xyz")
            .unwrap();
        assert_eq!(code.as_deref(), Some("abc"));
    }

    #[test]
    fn callback_without_code_is_ignored() {
        let code = parse_callback("http://127.0.0.1:8080/favicon.ico", "xyz").unwrap();
        assert!(code.is_none());
    }

    #[test]
    fn callback_state_mismatch_is_rejected() {
        assert!(parse_callback("http://127.0.0.1:8080/callback?code=abc&state=evil", "xyz").is_err());
    }

    #[test]
    fn callback_error_is_reported() {
        let err = parse_callback("http://127.0.0.1:8080/callback?error=access_denied", "xyz")
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
