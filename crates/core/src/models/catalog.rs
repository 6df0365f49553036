#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

use super::{coerce, User, UserRole};

/// Catalog entry offered by providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(deserialize_with = "coerce::id")]
    pub id: i64,
    pub descricao: String,
    pub tipo_servico: String,
    /// Base hourly price.
    #[serde(deserialize_with = "coerce::money")]
    pub valor_hora: f64,
    #[serde(default)]
    pub mensagem: Option<String>,
}

impl Service {
    /// Service known only by id.
    pub(crate) fn reference(id: i64) -> Self {
        Self {
            id,
            descricao: String::new(),
            tipo_servico: String::new(),
            valor_hora: 0.0,
            mensagem: None,
        }
    }
}

/// Payload for adding a service to the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub descricao: String,
    pub tipo_servico: String,
    pub valor_hora: f64,
    pub mensagem: String,
}

impl NewService {
    pub(crate) fn validate(&self) -> ApiResult<()> {
        ensure_positive("valorHora", self.valor_hora)
    }
}

/// A provider advertising a catalog service, optionally with its own price
/// and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderServiceLink {
    #[serde(deserialize_with = "coerce::id")]
    pub id: i64,
    pub usuario: User,
    pub servico: Service,
    #[serde(default, deserialize_with = "coerce::optional_money")]
    pub preco_personalizado: Option<f64>,
    #[serde(default)]
    pub descricao: Option<String>,
}

impl ProviderServiceLink {
    /// Custom price when the provider set one, catalog price otherwise.
    pub fn effective_price(&self) -> f64 {
        self.preco_personalizado.unwrap_or(self.servico.valor_hora)
    }

    /// Provider's own description when non-empty, catalog description otherwise.
    pub fn effective_description(&self) -> &str {
        self.descricao
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.servico.descricao)
    }
}

/// Input for linking a provider to a catalog service.
#[derive(Debug, Clone, Default)]
pub struct NewProviderLink {
    pub usuario_id: Option<i64>,
    pub servico_id: Option<i64>,
    pub preco_personalizado: Option<f64>,
    pub descricao: Option<String>,
}

impl NewProviderLink {
    pub(crate) fn validate(&self) -> ApiResult<(i64, i64)> {
        let usuario_id = self
            .usuario_id
            .ok_or_else(|| ApiError::validation("usuarioId is required"))?;
        let servico_id = self
            .servico_id
            .ok_or_else(|| ApiError::validation("servicoId is required"))?;
        if let Some(price) = self.preco_personalizado {
            ensure_positive("precoPersonalizado", price)?;
        }
        Ok((usuario_id, servico_id))
    }

    /// Link as requested, for replies that only confirm the new id.
    pub(crate) fn requested_link(
        &self,
        id: i64,
        usuario_id: i64,
        servico_id: i64,
    ) -> ProviderServiceLink {
        ProviderServiceLink {
            id,
            usuario: User::reference(usuario_id, UserRole::Fornecedor),
            servico: Service::reference(servico_id),
            preco_personalizado: self.preco_personalizado,
            descricao: self
                .descricao
                .as_deref()
                .map(str::trim)
                .filter(|descricao| !descricao.is_empty())
                .map(str::to_string),
        }
    }
}

/// Narrowing applied to provider link listings.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    /// Exact, case-sensitive match on `servico.tipoServico`.
    pub tipo_servico: Option<String>,
    /// Only links owned by this provider.
    pub usuario_id: Option<i64>,
}

impl LinkFilter {
    pub fn by_type(tipo_servico: impl Into<String>) -> Self {
        Self {
            tipo_servico: Some(tipo_servico.into()),
            ..Self::default()
        }
    }

    pub fn by_provider(usuario_id: i64) -> Self {
        Self {
            usuario_id: Some(usuario_id),
            ..Self::default()
        }
    }

    /// Whether `link` passes every set criterion.
    pub fn matches(&self, link: &ProviderServiceLink) -> bool {
        let type_ok = self
            .tipo_servico
            .as_deref()
            .map(|wanted| link.servico.tipo_servico == wanted)
            .unwrap_or(true);
        let provider_ok = self
            .usuario_id
            .map(|wanted| link.usuario.id == wanted)
            .unwrap_or(true);
        type_ok && provider_ok
    }
}

fn ensure_positive(field: &str, value: f64) -> ApiResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "{field} must be a positive number"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(preco: serde_json::Value, descricao: serde_json::Value) -> ProviderServiceLink {
        serde_json::from_value(json!({
            "id": 9,
            "usuario": { "id": 2, "nome": "Bruno", "email": "b@example.com", "tipo": "fornecedor" },
            "servico": { "id": 5, "descricao": "Pintura residencial", "tipoServico": "Pintura", "valorHora": 40 },
            "precoPersonalizado": preco,
            "descricao": descricao
        }))
        .expect("link")
    }

    #[test]
    fn missing_custom_price_falls_back_to_catalog() {
        assert_eq!(link(json!(null), json!(null)).effective_price(), 40.0);
        assert_eq!(link(json!(""), json!(null)).effective_price(), 40.0);
        assert_eq!(link(json!("55"), json!(null)).effective_price(), 55.0);
    }

    #[test]
    fn blank_description_falls_back_to_catalog() {
        assert_eq!(
            link(json!(null), json!("  ")).effective_description(),
            "Pintura residencial"
        );
        assert_eq!(
            link(json!(null), json!("Inclui material")).effective_description(),
            "Inclui material"
        );
    }

    #[test]
    fn hourly_rate_must_be_positive() {
        let mut service = NewService {
            descricao: "Faxina".to_string(),
            tipo_servico: "Limpeza".to_string(),
            valor_hora: 0.0,
            mensagem: String::new(),
        };
        assert!(matches!(service.validate(), Err(ApiError::Validation(_))));
        service.valor_hora = f64::NAN;
        assert!(matches!(service.validate(), Err(ApiError::Validation(_))));
        service.valor_hora = 35.0;
        assert!(service.validate().is_ok());
    }

    #[test]
    fn type_filter_is_case_sensitive() {
        let link = link(json!(null), json!(null));
        assert!(LinkFilter::by_type("Pintura").matches(&link));
        assert!(!LinkFilter::by_type("pintura").matches(&link));
        assert!(LinkFilter::default().matches(&link));
        assert!(!LinkFilter::by_provider(3).matches(&link));
    }
}
