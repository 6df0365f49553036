//! Login, registration and logout on top of the API client.

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    api::{client::to_json, ApiClient, RequestOptions},
    error::{ApiError, ApiResult},
    models::{NewUser, Session, User},
};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    usuario: User,
}

/// Account operations. Login and registration never send a stored token.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Authenticate and store the resulting session.
    pub async fn login(&self, email: &str, senha: &str) -> ApiResult<Session> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::validation("email is required"));
        }
        if senha.is_empty() {
            return Err(ApiError::validation("senha is required"));
        }

        let body = self
            .client
            .request(
                "/usuarios/login",
                RequestOptions::new(Method::POST)
                    .json(json!({ "email": email, "senha": senha }))
                    .unauthenticated(),
            )
            .await?;
        let response: LoginResponse = ApiClient::decode(body)?;
        if response.access_token.trim().is_empty() {
            return Err(ApiError::InvalidResponse(
                "login succeeded without an access token".to_string(),
            ));
        }

        let session = Session {
            token: response.access_token,
            user: response.usuario,
        };
        self.client
            .session()
            .set(session.clone())
            .map_err(ApiError::Storage)?;
        info!(user_id = session.user.id, role = %session.user.tipo, "logged in");
        Ok(session)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, new_user: &NewUser) -> ApiResult<User> {
        new_user.validate()?;
        let body = self
            .client
            .request(
                "/usuarios",
                RequestOptions::new(Method::POST)
                    .json(to_json(new_user)?)
                    .unauthenticated(),
            )
            .await?;
        let user: User = ApiClient::decode(body)?;
        info!(user_id = user.id, role = %user.tipo, "account registered");
        Ok(user)
    }

    /// Forget the stored session.
    pub fn logout(&self) -> ApiResult<()> {
        self.client.session().clear().map_err(ApiError::Storage)?;
        info!("logged out");
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.client.session().get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }
}
