#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

use super::coerce;

/// Role fixed when the account is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Hires services.
    Cliente,
    /// Offers services.
    Fornecedor,
}

impl UserRole {
    /// Wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Cliente => "cliente",
            UserRole::Fornecedor => "fornecedor",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account as returned by the backend. The password never comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Backend identifier.
    #[serde(deserialize_with = "coerce::id")]
    pub id: i64,
    /// Display name.
    pub nome: String,
    /// Login e-mail.
    pub email: String,
    /// Phone number.
    #[serde(default)]
    pub telefone: Option<String>,
    /// Brazilian taxpayer id.
    #[serde(default)]
    pub cpf: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub endereco: Option<String>,
    /// Account role.
    pub tipo: UserRole,
}

impl User {
    /// True for provider accounts.
    pub fn is_provider(&self) -> bool {
        self.tipo == UserRole::Fornecedor
    }

    /// User known only by id and role. Name and e-mail are filled by the next listing.
    pub(crate) fn reference(id: i64, tipo: UserRole) -> Self {
        Self {
            id,
            nome: String::new(),
            email: String::new(),
            telefone: None,
            cpf: None,
            endereco: None,
            tipo,
        }
    }
}

/// Registration payload.
#[derive(Clone, Serialize)]
pub struct NewUser {
    /// Display name.
    pub nome: String,
    /// Login e-mail.
    pub email: String,
    /// Plain password, sent once and never stored locally.
    pub senha: String,
    /// Phone number.
    pub telefone: String,
    /// Brazilian taxpayer id.
    pub cpf: String,
    /// Postal address.
    pub endereco: String,
    /// Account role.
    pub tipo: UserRole,
}

impl NewUser {
    pub(crate) fn validate(&self) -> ApiResult<()> {
        for (field, value) in [
            ("nome", &self.nome),
            ("email", &self.email),
            ("senha", &self.senha),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::validation(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("nome", &self.nome)
            .field("email", &self.email)
            .field("senha", &"<redacted>")
            .field("tipo", &self.tipo)
            .finish()
    }
}

/// Authenticated token and the profile it belongs to.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// Logged-in user.
    #[serde(rename = "usuario")]
    pub user: User,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}
