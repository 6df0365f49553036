#![allow(missing_docs)]

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

use super::{coerce, Service, User, UserRole};

/// Lifecycle stage derived from a contract's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStatus {
    Open,
    Closed,
    Rated,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractStatus::Open => "open",
            ContractStatus::Closed => "closed",
            ContractStatus::Rated => "rated",
        };
        f.write_str(label)
    }
}

/// Hiring agreement between a client and a provider for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    #[serde(deserialize_with = "coerce::id")]
    pub id: i64,
    pub servico: Service,
    pub fornecedor: User,
    pub cliente: User,
    /// Day the contract was created.
    #[serde(default, deserialize_with = "coerce::optional_date")]
    pub data: Option<NaiveDate>,
    /// Set once, when the provider closes the contract.
    #[serde(default, deserialize_with = "coerce::optional_date")]
    pub data_conclusao: Option<NaiveDate>,
    #[serde(default)]
    pub nota_prazo: Option<u8>,
    #[serde(default)]
    pub nota_qualidade: Option<u8>,
    #[serde(default)]
    pub nota_preco: Option<u8>,
    #[serde(default)]
    pub comentario: Option<String>,
}

impl Contract {
    pub fn status(&self) -> ContractStatus {
        if self.data_conclusao.is_none() {
            ContractStatus::Open
        } else if self.is_rated() {
            ContractStatus::Rated
        } else {
            ContractStatus::Closed
        }
    }

    /// Any rating field set counts as rated.
    pub fn is_rated(&self) -> bool {
        self.nota_prazo.is_some() || self.nota_qualidade.is_some() || self.nota_preco.is_some()
    }

    /// Check the parties carry the roles their position implies.
    pub(crate) fn check_roles(&self) -> ApiResult<()> {
        if self.fornecedor.tipo != UserRole::Fornecedor {
            return Err(ApiError::InvalidResponse(format!(
                "contract {} lists user {} as provider but their role is {}",
                self.id, self.fornecedor.id, self.fornecedor.tipo
            )));
        }
        if self.cliente.tipo != UserRole::Cliente {
            return Err(ApiError::InvalidResponse(format!(
                "contract {} lists user {} as client but their role is {}",
                self.id, self.cliente.id, self.cliente.tipo
            )));
        }
        Ok(())
    }

    /// Open contract as requested, for replies that only confirm the new id.
    pub(crate) fn opened(id: i64, payload: &ContractPayload, data: NaiveDate) -> Self {
        Self {
            id,
            servico: Service::reference(payload.servico_id),
            fornecedor: User::reference(payload.fornecedor_id, UserRole::Fornecedor),
            cliente: User::reference(payload.cliente_id, UserRole::Cliente),
            data: Some(data),
            data_conclusao: None,
            nota_prazo: None,
            nota_qualidade: None,
            nota_preco: None,
            comentario: None,
        }
    }

    pub(crate) fn ensure_can_close(&self) -> ApiResult<()> {
        match self.status() {
            ContractStatus::Open => Ok(()),
            _ => Err(ApiError::State(format!(
                "contract {} is already closed",
                self.id
            ))),
        }
    }

    pub(crate) fn ensure_can_rate(&self) -> ApiResult<()> {
        match self.status() {
            ContractStatus::Closed => Ok(()),
            ContractStatus::Open => Err(ApiError::State(format!(
                "contract {} must be closed before it can be rated",
                self.id
            ))),
            ContractStatus::Rated => Err(ApiError::State(format!(
                "contract {} has already been rated",
                self.id
            ))),
        }
    }

    pub(crate) fn apply_rating(&mut self, rating: &Rating) {
        self.nota_prazo = Some(rating.nota_prazo);
        self.nota_qualidade = Some(rating.nota_qualidade);
        self.nota_preco = Some(rating.nota_preco);
        self.comentario = rating.comentario.clone();
    }
}

/// Input for hiring a provider's service.
#[derive(Debug, Clone, Default)]
pub struct NewContract {
    pub cliente_id: Option<i64>,
    pub fornecedor_id: Option<i64>,
    pub servico_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContractPayload {
    pub cliente_id: i64,
    pub fornecedor_id: i64,
    pub servico_id: i64,
}

impl NewContract {
    pub(crate) fn validate(&self) -> ApiResult<ContractPayload> {
        let require = |value: Option<i64>, field: &str| {
            value.ok_or_else(|| ApiError::validation(format!("{field} is required")))
        };
        Ok(ContractPayload {
            cliente_id: require(self.cliente_id, "clienteId")?,
            fornecedor_id: require(self.fornecedor_id, "fornecedorId")?,
            servico_id: require(self.servico_id, "servicoId")?,
        })
    }
}

/// Scores for deadline, quality and price, plus an optional comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub nota_prazo: u8,
    pub nota_qualidade: u8,
    pub nota_preco: u8,
    pub comentario: Option<String>,
}

impl Rating {
    pub fn new(nota_prazo: u8, nota_qualidade: u8, nota_preco: u8) -> Self {
        Self {
            nota_prazo,
            nota_qualidade,
            nota_preco,
            comentario: None,
        }
    }

    pub fn with_comment(mut self, comentario: impl Into<String>) -> Self {
        self.comentario = Some(comentario.into());
        self
    }

    pub(crate) fn validate(&self) -> ApiResult<()> {
        for (field, score) in [
            ("notaPrazo", self.nota_prazo),
            ("notaQualidade", self.nota_qualidade),
            ("notaPreco", self.nota_preco),
        ] {
            if !(1..=5).contains(&score) {
                return Err(ApiError::validation(format!(
                    "{field} must be between 1 and 5, got {score}"
                )));
            }
        }
        Ok(())
    }
}
