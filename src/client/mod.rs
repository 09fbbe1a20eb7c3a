//! Typed wrapper around the Service's REST surface: session establishment
//! with two-factor support, file/version lifecycle, avatar CRUD.
//!
//! Grounded on the request/response shape in
//! `sweetmcp-memory/src/llm/anthropic.rs`'s `AnthropicProvider`: one struct
//! holding a cloned `reqwest::Client` plus fixed config, one method per
//! endpoint, a `match response.status()` dispatch translating status codes
//! into typed errors.

pub mod cookie;
pub mod models;
pub mod url;

use reqwest::{Response, StatusCode};
use tracing::{debug, warn};

use crate::config::AppConfig;
use cookie::CookieJar;
use models::*;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("two-factor verification failed")]
    TwoFactorFailed,
    #[error("avatar not found")]
    AvatarNotFound,
    #[error("blueprint ID already in use")]
    BlueprintIdTaken,
    #[error("service returned {status}: {body}")]
    Unexpected { status: u16, body: String },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One of the three possible outcomes of `getUser`, per SPEC_FULL.md §4.4 —
/// an exhaustive tagged sum, no runtime type tests.
#[derive(Debug, Clone)]
pub enum GetUserOutcome {
    User(UserResponse),
    TwoFactorRequired {
        kind: TwoFactorKind,
        auth_cookie: String,
    },
    InvalidCredentials,
}

pub struct ServiceClient {
    http: reqwest::Client,
    config: &'static AppConfig,
}

impl ServiceClient {
    pub fn new(config: &'static AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.control_plane_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, config })
    }

    /// Expose the underlying transport so the upload driver can stream
    /// bytes directly to pre-signed URLs, which live outside this client's
    /// own `base_url`.
    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn cookie_header(jar: &CookieJar) -> String {
        jar.to_header_value()
    }

    /// Parse every `Set-Cookie` header off a response into a [`CookieJar`].
    fn extract_cookies(response: &Response) -> CookieJar {
        let values: Vec<&str> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        cookie::parse_set_cookie_headers(values)
    }

    // ---- Authentication ----------------------------------------------

    /// `GET /auth/user`. Uses HTTP Basic with URL-encoded credentials when
    /// supplied, cookies otherwise. A `401` maps to `InvalidCredentials`
    /// rather than an error.
    pub async fn get_user(
        &self,
        credentials: Option<(&str, &str)>,
        cookies: &CookieJar,
    ) -> Result<(GetUserOutcome, CookieJar), ServiceError> {
        let mut request = self.http.get(self.url("/auth/user"));
        request = match credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request.header(reqwest::header::COOKIE, Self::cookie_header(cookies)),
        };

        let response = request.send().await?;
        let new_cookies = Self::extract_cookies(&response);

        match response.status() {
            StatusCode::UNAUTHORIZED => Ok((GetUserOutcome::InvalidCredentials, new_cookies)),
            StatusCode::OK => {
                let body = response.text().await?;
                if let Ok(requires) = serde_json::from_str::<RequiresTwoFactorResponse>(&body) {
                    if let Some(kind_name) = requires.requires_two_factor_auth.first() {
                        let kind = TwoFactorKind::from_api_name(kind_name)
                            .unwrap_or(TwoFactorKind::EmailOtp);
                        let auth_cookie = new_cookies.auth.clone().unwrap_or_default();
                        return Ok((
                            GetUserOutcome::TwoFactorRequired { kind, auth_cookie },
                            new_cookies,
                        ));
                    }
                }
                let user: UserResponse = serde_json::from_str(&body)?;
                Ok((GetUserOutcome::User(user), new_cookies))
            }
            status => Err(unexpected(status, response).await),
        }
    }

    /// `POST /auth/twofactorauth/{kind}/verify`, returning the
    /// `twoFactorAuth` cookie from the response.
    pub async fn verify_two_factor(
        &self,
        auth_cookie: &str,
        kind: TwoFactorKind,
        code: &str,
    ) -> Result<String, ServiceError> {
        let url = self.url(&format!(
            "/auth/twofactorauth/{}/verify",
            kind.as_path_segment()
        ));
        let jar = CookieJar::new(Some(auth_cookie.to_string()), None);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::COOKIE, Self::cookie_header(&jar))
            .json(&VerifyTwoFactorBody {
                code: code.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(if response.status() == StatusCode::UNAUTHORIZED {
                ServiceError::TwoFactorFailed
            } else {
                unexpected(response.status(), response).await
            });
        }

        let new_cookies = Self::extract_cookies(&response);
        new_cookies
            .two_factor_auth
            .ok_or(ServiceError::TwoFactorFailed)
    }

    /// `GET /auth` — cookie revalidation. Not called by `publish()` itself;
    /// exposed so a long-lived session can check cookie validity up front.
    pub async fn revalidate_session(&self, cookies: &CookieJar) -> Result<bool, ServiceError> {
        let response = self
            .http
            .get(self.url("/auth"))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// `PUT /logout` — best-effort; failures are logged and swallowed.
    pub async fn logout(&self, cookies: &CookieJar) {
        let result = self
            .http
            .put(self.url("/logout"))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await;
        if let Err(e) = result {
            warn!("logout request failed, ignoring: {e}");
        }
    }

    // ---- File lifecycle -------------------------------------------------

    pub async fn create_file(
        &self,
        cookies: &CookieJar,
        name: &str,
        mime_type: &str,
        extension: &str,
        tags: Vec<String>,
    ) -> Result<FileRecord, ServiceError> {
        let response = self
            .http
            .post(self.url("/file"))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .json(&CreateFileBody {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                extension: extension.to_string(),
                tags,
            })
            .send()
            .await?;
        json_or_err(response).await
    }

    pub async fn create_file_version(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        body: CreateFileVersionBody,
    ) -> Result<FileRecord, ServiceError> {
        let response = self
            .http
            .post(self.url(&format!("/file/{file_id}")))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .json(&body)
            .send()
            .await?;
        json_or_err(response).await
    }

    pub async fn start_file_upload(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version_id: u32,
        subresource: Subresource,
        part_number: Option<u32>,
    ) -> Result<String, ServiceError> {
        let mut url = self.url(&format!(
            "/file/{file_id}/{version_id}/{}/start",
            subresource.as_path_segment()
        ));
        if let Some(n) = part_number {
            url = format!("{url}?partNumber={n}");
        }
        let response = self
            .http
            .put(url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;
        let start: StartUploadResponse = json_or_err(response).await?;
        Ok(start.url)
    }

    pub async fn finish_file_upload(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version_id: u32,
        subresource: Subresource,
        etags: Option<Vec<String>>,
    ) -> Result<FileRecord, ServiceError> {
        let response = self
            .http
            .put(self.url(&format!(
                "/file/{file_id}/{version_id}/{}/finish",
                subresource.as_path_segment()
            )))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .json(&FinishUploadBody { etags })
            .send()
            .await?;
        json_or_err(response).await
    }

    pub async fn show_file(
        &self,
        cookies: &CookieJar,
        file_id: &str,
    ) -> Result<FileRecord, ServiceError> {
        let response = self
            .http
            .get(self.url(&format!("/file/{file_id}")))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;
        json_or_err(response).await
    }

    pub async fn delete_file_version(
        &self,
        cookies: &CookieJar,
        file_id: &str,
        version: u32,
    ) -> Result<(), ServiceError> {
        let response = self
            .http
            .delete(self.url(&format!("/file/{file_id}/{version}")))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(response.status(), response).await)
        }
    }

    // ---- Avatar lifecycle -----------------------------------------------

    pub async fn get_avatar(
        &self,
        cookies: &CookieJar,
        id: &str,
    ) -> Result<Option<Avatar>, ServiceError> {
        let response = self
            .http
            .get(self.url(&format!("/avatars/{id}")))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("avatar {id} not found, treating as new-avatar branch");
            return Ok(None);
        }
        Ok(Some(json_or_err(response).await?))
    }

    pub async fn create_avatar(
        &self,
        cookies: &CookieJar,
        body: CreateAvatarBody,
    ) -> Result<Avatar, ServiceError> {
        let response = self
            .http
            .post(self.url("/avatars"))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return Err(ServiceError::BlueprintIdTaken);
        }
        json_or_err(response).await
    }

    pub async fn update_avatar(
        &self,
        cookies: &CookieJar,
        id: &str,
        patch: UpdateAvatarBody,
    ) -> Result<Avatar, ServiceError> {
        let response = self
            .http
            .put(self.url(&format!("/avatars/{id}")))
            .header(reqwest::header::COOKIE, Self::cookie_header(cookies))
            .json(&patch)
            .send()
            .await?;
        json_or_err(response).await
    }
}

async fn json_or_err<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    } else {
        Err(unexpected(status, response).await)
    }
}

async fn unexpected(status: StatusCode, response: Response) -> ServiceError {
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        ServiceError::InvalidCredentials
    } else {
        ServiceError::Unexpected {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn client(server_url: &str) -> ServiceClient {
        let cfg = Box::leak(Box::new(AppConfig {
            user_agent: "Third Uploader/test test@example.com".to_string(),
            base_url: server_url.to_string(),
            control_plane_timeout: std::time::Duration::from_secs(5),
        }));
        ServiceClient::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn get_user_401_maps_to_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/auth/user")
            .with_status(401)
            .create_async()
            .await;

        let client = client(&server.url());
        let (outcome, _) = client
            .get_user(Some(("alice", "wrong")), &CookieJar::default())
            .await
            .unwrap();
        assert!(matches!(outcome, GetUserOutcome::InvalidCredentials));
    }

    #[tokio::test]
    async fn get_user_requires_two_factor() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/auth/user")
            .with_status(200)
            .with_header("set-cookie", "auth=partial-cookie; Path=/")
            .with_body(r#"{"requiresTwoFactorAuth":["emailotp"]}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let (outcome, cookies) = client
            .get_user(Some(("alice", "pw")), &CookieJar::default())
            .await
            .unwrap();
        match outcome {
            GetUserOutcome::TwoFactorRequired { kind, auth_cookie } => {
                assert_eq!(kind, TwoFactorKind::EmailOtp);
                assert_eq!(auth_cookie, "partial-cookie");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(cookies.auth.as_deref(), Some("partial-cookie"));
    }

    #[tokio::test]
    async fn get_avatar_404_is_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/avatars/avtr_missing")
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server.url());
        let avatar = client
            .get_avatar(&CookieJar::default(), "avtr_missing")
            .await
            .unwrap();
        assert!(avatar.is_none());
    }

    #[tokio::test]
    async fn create_avatar_500_is_blueprint_id_taken() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/avatars")
            .with_status(500)
            .create_async()
            .await;

        let client = client(&server.url());
        let err = client
            .create_avatar(
                &CookieJar::default(),
                CreateAvatarBody {
                    id: "avtr_1".into(),
                    name: "x".into(),
                    image_url: "".into(),
                    release_status: "private".into(),
                    unity_version: "2022.3.6f1".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BlueprintIdTaken));
    }

    #[tokio::test]
    async fn start_file_upload_includes_part_number() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("PUT", "/file/file_1/1/file/start")
            .match_query(mockito::Matcher::UrlEncoded("partNumber".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"url":"https://presigned.example/part2"}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client
            .start_file_upload(&CookieJar::default(), "file_1", 1, Subresource::File, Some(2))
            .await
            .unwrap();
        assert_eq!(url, "https://presigned.example/part2");
    }

    #[test]
    fn config_init_is_idempotent_smoke() {
        config::init("9.9.9", "smoke@example.com");
        let _ = config::get();
    }
}
