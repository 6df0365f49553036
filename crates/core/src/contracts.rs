//! Contract lifecycle: `open -> closed -> rated`.
//!
//! The service keeps the last snapshot it saw of every contract so illegal
//! transitions are refused before a request goes out. Snapshots never answer
//! reads; listings always hit the backend.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    error::{ApiError, ApiResult},
    models::{coerce, Contract, ContractStatus, NewContract, Rating},
};

/// Operations on `/contratos`.
#[derive(Debug)]
pub struct ContractService {
    client: ApiClient,
    known: RwLock<HashMap<i64, Contract>>,
}

impl ContractService {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Hire a provider's service. The new contract is open.
    pub async fn create(&self, input: &NewContract) -> ApiResult<Contract> {
        let payload = input.validate()?;
        let body = self.client.post("/contratos", &payload).await?;
        let reply_id = coerce::record_id(&body);
        let contract = match ApiClient::decode::<Contract>(body) {
            Ok(contract) => {
                contract.check_roles()?;
                contract
            }
            // a 2xx means the contract exists even when the reply is sparse
            Err(err) => match reply_id {
                Some(id) => {
                    debug!(contract_id = id, "contract reply is not a full record: {err}");
                    Contract::opened(id, &payload, today())
                }
                None => {
                    let listed = self.list_for_client(payload.cliente_id).await?;
                    listed
                        .into_iter()
                        .filter(|contract| {
                            contract.fornecedor.id == payload.fornecedor_id
                                && contract.servico.id == payload.servico_id
                                && contract.status() == ContractStatus::Open
                        })
                        .max_by_key(|contract| contract.id)
                        .ok_or(err)?
                }
            },
        };
        info!(
            contract_id = contract.id,
            cliente_id = contract.cliente.id,
            fornecedor_id = contract.fornecedor.id,
            "contract created"
        );
        self.remember(&contract);
        Ok(contract)
    }

    /// Contracts hired by a client.
    pub async fn list_for_client(&self, cliente_id: i64) -> ApiResult<Vec<Contract>> {
        let contracts = self
            .list(&format!("/contratos?clienteId={cliente_id}"))
            .await?;
        debug!(cliente_id, total = contracts.len(), "client contracts listed");
        Ok(contracts)
    }

    /// Contracts served by a provider. Entries for other providers are
    /// dropped even when the backend returns them.
    pub async fn list_for_provider(&self, fornecedor_id: i64) -> ApiResult<Vec<Contract>> {
        let contracts = self
            .list(&format!("/contratos?fornecedorId={fornecedor_id}"))
            .await?;
        let received = contracts.len();
        let contracts: Vec<Contract> = contracts
            .into_iter()
            .filter(|contract| contract.fornecedor.id == fornecedor_id)
            .collect();
        if contracts.len() != received {
            warn!(
                fornecedor_id,
                dropped = received - contracts.len(),
                "backend returned contracts of other providers"
            );
        }
        debug!(fornecedor_id, total = contracts.len(), "provider contracts listed");
        Ok(contracts)
    }

    /// Mark a contract as finished today.
    pub async fn close(&self, contract_id: i64) -> ApiResult<Contract> {
        if let Some(known) = self.known(contract_id) {
            known.ensure_can_close()?;
        }

        let today = today();
        let body = self
            .client
            .patch(
                &format!("/contratos/{contract_id}/encerrar"),
                &json!({ "dataConclusao": today }),
            )
            .await
            .map_err(conflict_as_state)?;

        let mut contract = self.resolve(contract_id, body, |contract| {
            contract.data_conclusao = Some(today);
        })?;
        if contract.data_conclusao.is_none() {
            contract.data_conclusao = Some(today);
        }
        info!(contract_id, %today, "contract closed");
        self.remember(&contract);
        Ok(contract)
    }

    /// Submit the client's rating of a closed contract. A contract is rated
    /// once.
    pub async fn rate(&self, contract_id: i64, rating: &Rating) -> ApiResult<Contract> {
        let known = self.known(contract_id);
        if let Some(contract) = &known {
            contract.ensure_can_rate()?;
        }
        rating.validate()?;

        let mut body = Map::new();
        body.insert("notaPrazo".to_string(), json!(rating.nota_prazo));
        body.insert("notaQualidade".to_string(), json!(rating.nota_qualidade));
        body.insert("notaPreco".to_string(), json!(rating.nota_preco));
        body.insert("comentario".to_string(), json!(rating.comentario));
        if let Some(data_conclusao) = known.as_ref().and_then(|c| c.data_conclusao) {
            body.insert("dataConclusao".to_string(), json!(data_conclusao));
        }

        let response = self
            .client
            .patch(
                &format!("/contratos/{contract_id}/avaliar"),
                &Value::Object(body),
            )
            .await
            .map_err(conflict_as_state)?;

        let mut contract =
            self.resolve(contract_id, response, |contract| contract.apply_rating(rating))?;
        if !contract.is_rated() {
            contract.apply_rating(rating);
        }
        info!(
            contract_id,
            nota_prazo = rating.nota_prazo,
            nota_qualidade = rating.nota_qualidade,
            nota_preco = rating.nota_preco,
            "contract rated"
        );
        self.remember(&contract);
        Ok(contract)
    }

    /// Last snapshot seen for a contract, if any.
    pub fn known(&self, contract_id: i64) -> Option<Contract> {
        self.known.read().get(&contract_id).cloned()
    }

    /// Lifecycle stage of a contract this service has seen.
    pub fn known_status(&self, contract_id: i64) -> Option<ContractStatus> {
        self.known.read().get(&contract_id).map(Contract::status)
    }

    async fn list(&self, path: &str) -> ApiResult<Vec<Contract>> {
        let body = self.client.get(path).await?;
        let contracts: Vec<Contract> = ApiClient::decode_list(body)?;
        for contract in &contracts {
            contract.check_roles()?;
        }
        let mut known = self.known.write();
        for contract in &contracts {
            known.insert(contract.id, contract.clone());
        }
        Ok(contracts)
    }

    /// Contract from a transition response. Bodies that do not decode as a
    /// contract fall back to the known snapshot with `update` applied.
    fn resolve(
        &self,
        contract_id: i64,
        body: Value,
        update: impl FnOnce(&mut Contract),
    ) -> ApiResult<Contract> {
        let err = match ApiClient::decode::<Contract>(body) {
            Ok(contract) => {
                contract.check_roles()?;
                return Ok(contract);
            }
            Err(err) => err,
        };
        let Some(mut contract) = self.known(contract_id) else {
            warn!(contract_id, "transition reply unusable and contract never listed");
            return Err(err);
        };
        debug!(contract_id, "transition reply is not a full record: {err}");
        update(&mut contract);
        Ok(contract)
    }

    /// Drop every remembered snapshot, e.g. when the user signs out.
    pub fn forget_all(&self) {
        let mut known = self.known.write();
        debug!(forgotten = known.len(), "contract snapshots cleared");
        known.clear();
    }

    fn remember(&self, contract: &Contract) {
        self.known.write().insert(contract.id, contract.clone());
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn conflict_as_state(err: ApiError) -> ApiError {
    match err {
        ApiError::Request { status, message } if status == StatusCode::CONFLICT.as_u16() => {
            ApiError::State(message)
        }
        other => other,
    }
}
