use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT};
use serde::Deserialize;

use crate::domain::CatalogId;
use crate::error::TleError;

pub const DEFAULT_BASE_URL: &str = "https://www.space-track.org";

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

pub trait CatalogClient: Send + Sync {
    fn login(&self, credentials: &Credentials) -> Result<SessionToken, TleError>;

    fn fetch_latest(&self, token: &SessionToken, catalog_id: CatalogId)
    -> Result<String, TleError>;
}

#[derive(Clone)]
pub struct SpaceTrackHttpClient {
    client: Client,
    base_url: String,
}

impl SpaceTrackHttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TleError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tle-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| TleError::CatalogHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| TleError::CatalogHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn latest_url(&self, catalog_id: CatalogId) -> String {
        format!(
            "{}/basicspacedata/query/class/gp/NORAD_CAT_ID/{}/orderby/EPOCH%20desc/limit/1/format/3le",
            self.base_url, catalog_id
        )
    }
}

impl CatalogClient for SpaceTrackHttpClient {
    fn login(&self, credentials: &Credentials) -> Result<SessionToken, TleError> {
        let url = format!("{}/ajaxauth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("identity", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .map_err(|err| TleError::CatalogHttp(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TleError::Throttled);
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TleError::LoginRejected(format!("status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(status_error(response, "catalog login failed"));
        }

        let cookies = session_cookies(response.headers());
        let body = response
            .text()
            .map_err(|err| TleError::CatalogHttp(err.to_string()))?;
        check_login_reply(&body)?;
        if cookies.is_empty() {
            return Err(TleError::LoginRejected(
                "no session cookie in login response".to_string(),
            ));
        }
        Ok(SessionToken::new(cookies))
    }

    fn fetch_latest(
        &self,
        token: &SessionToken,
        catalog_id: CatalogId,
    ) -> Result<String, TleError> {
        let cookie = HeaderValue::from_str(token.as_str())
            .map_err(|err| TleError::Unauthorized(err.to_string()))?;
        let response = self
            .client
            .get(self.latest_url(catalog_id))
            .header(COOKIE, cookie)
            .send()
            .map_err(|err| TleError::CatalogHttp(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TleError::Throttled);
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TleError::Unauthorized(format!("status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(status_error(response, "catalog query failed"));
        }

        let body = response
            .text()
            .map_err(|err| TleError::CatalogHttp(err.to_string()))?;
        if body.trim().is_empty() {
            return Err(TleError::NoElementSet(catalog_id.to_string()));
        }
        Ok(body)
    }
}

fn status_error(response: Response, fallback: &str) -> TleError {
    let status = response.status().as_u16();
    let message = response.text().unwrap_or_else(|_| fallback.to_string());
    TleError::CatalogStatus { status, message }
}

fn session_cookies(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoginReply {
    Status {
        #[serde(rename = "Login")]
        login: Option<String>,
    },
    Message(String),
}

fn check_login_reply(body: &str) -> Result<(), TleError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(());
    }
    let reply: LoginReply = serde_json::from_str(body)
        .map_err(|err| TleError::CatalogHttp(format!("unexpected login reply: {err}")))?;
    match reply {
        LoginReply::Status { login: Some(status) } => Err(TleError::LoginRejected(format!(
            "catalog answered Login={status}"
        ))),
        LoginReply::Status { login: None } | LoginReply::Message(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn joins_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("chocolatechip=abc123; path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("spacetrack_csrf=xyz; path=/"));
        assert_eq!(
            session_cookies(&headers),
            "chocolatechip=abc123; spacetrack_csrf=xyz"
        );
    }

    #[test]
    fn login_reply_with_login_status_is_rejected() {
        assert_matches!(
            check_login_reply("{\"Login\": \"Failed\"}"),
            Err(TleError::LoginRejected(_))
        );
        assert_matches!(
            check_login_reply("{\"Login\":\"Rejected\"}"),
            Err(TleError::LoginRejected(_))
        );
    }

    #[test]
    fn login_reply_success_shapes() {
        assert_matches!(check_login_reply(""), Ok(()));
        assert_matches!(check_login_reply("\"\""), Ok(()));
        assert_matches!(
            check_login_reply("{\"message\":\"use \\\"Login\\\":\\\"Failed\\\" to test\"}"),
            Ok(())
        );
    }

    #[test]
    fn login_reply_that_is_not_json_is_an_error() {
        assert_matches!(
            check_login_reply("<html>maintenance</html>"),
            Err(TleError::CatalogHttp(_))
        );
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: "ops".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
