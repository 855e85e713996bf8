//! OAuth resource-owner password grant.

use std::time::Duration;

use reqwest::Client;
use tracing::{info, instrument};
use wisdom_shared::{ClientCredentials, OAuthConfig, Result, WisdomError};

use crate::USER_AGENT;
use crate::responses::{TokenError, TokenResponse};

/// Bearer token plus the instance it was issued for.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    /// Instance base URL returned with the token, when the server sends one.
    pub instance_url: Option<String>,
}

/// Username/password pair supplied on the command line.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// Exchange user credentials for an access token.
///
/// Any failure here is fatal for the run and maps to [`WisdomError::Auth`].
#[instrument(skip_all, fields(token_host = %oauth.token_host, username = %user.username))]
pub async fn authenticate(
    oauth: &OAuthConfig,
    client: &ClientCredentials,
    user: &UserCredentials,
) -> Result<AccessToken> {
    let token_url = format!(
        "{}/{}",
        oauth.token_host.trim_end_matches('/'),
        oauth.token_path.trim_start_matches('/')
    );

    let http = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| WisdomError::Network(format!("failed to build HTTP client: {e}")))?;

    let form = [
        ("grant_type", "password"),
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
        ("username", user.username.as_str()),
        ("password", user.password.as_str()),
    ];

    let response = http
        .post(&token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| WisdomError::Auth(format!("{token_url}: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| WisdomError::Auth(format!("{token_url}: failed to read body: {e}")))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<TokenError>(&body)
            .ok()
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or(body);
        return Err(WisdomError::Auth(format!("HTTP {status}: {detail}")));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| WisdomError::Auth(format!("malformed token response: {e}")))?;

    info!(instance_url = ?token.instance_url, "authenticated");

    Ok(AccessToken {
        access_token: token.access_token,
        instance_url: token.instance_url,
    })
}
