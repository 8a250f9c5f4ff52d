use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::{AuthError, AuthProvider, Session};
use crate::gateway::BackendClient;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorBody {
    fn message(self, fallback: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Password grant against `{base}/auth/v1`.
pub struct RestAuth {
    client: BackendClient,
}

impl RestAuth {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<TokenResponse, AuthError> {
        let mut url = self
            .client
            .endpoint("auth/v1/token")
            .map_err(|err| AuthError::Transport {
                message: err.to_string(),
            })?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        debug!(grant_type, "Requesting auth token");

        let response = self
            .client
            .request(Method::POST, url, None)
            .json(&body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json::<TokenResponse>().await?)
    }
}

async fn check(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("auth request failed");
    let message = serde_json::from_str::<AuthErrorBody>(&body)
        .unwrap_or_default()
        .message(reason);
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            AuthError::InvalidCredentials { message }
        }
        status if status.is_server_error() => AuthError::Transport { message },
        status => AuthError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

fn into_session(response: TokenResponse, fallback_email: &str) -> Session {
    let email = response
        .user
        .and_then(|user| user.email)
        .unwrap_or_else(|| fallback_email.to_string());
    Session {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        email,
        expires_at: response
            .expires_in
            .map(|seconds| OffsetDateTime::now_utc() + Duration::seconds(seconds)),
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .grant("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(into_session(response, email))
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        let token = session.refresh_token.as_deref().ok_or(AuthError::NotSignedIn)?;
        let response = self
            .grant("refresh_token", json!({ "refresh_token": token }))
            .await?;
        Ok(into_session(response, &session.email))
    }

    async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        let url = self
            .client
            .endpoint("auth/v1/logout")
            .map_err(|err| AuthError::Transport {
                message: err.to_string(),
            })?;
        let response = self
            .client
            .request(Method::POST, url, Some(&session.access_token))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_becomes_session() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"jwt","token_type":"bearer","expires_in":3600,"refresh_token":"r1","user":{"id":"u","email":"admin@happylife.org"}}"#,
        )
        .expect("token response");
        let session = into_session(response, "typed@happylife.org");
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.email, "admin@happylife.org");
        assert!(session.expires_at.is_some_and(|at| at > OffsetDateTime::now_utc()));
    }

    #[test]
    fn error_body_prefers_description() {
        let body: AuthErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .expect("error body");
        assert_eq!(body.message("Bad Request"), "Invalid login credentials");
        assert_eq!(AuthErrorBody::default().message("Bad Request"), "Bad Request");
    }
}
