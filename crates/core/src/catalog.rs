//! Catalog services and the providers advertising them.

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::{
    api::ApiClient,
    error::ApiResult,
    models::{coerce, LinkFilter, NewProviderLink, NewService, ProviderServiceLink, Service},
};

/// Operations on `/servicos` and `/usuarios-servicos`.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    client: ApiClient,
}

impl ServiceCatalog {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Add a service to the catalog.
    pub async fn create_service(&self, service: &NewService) -> ApiResult<Service> {
        service.validate()?;
        let body = self.client.post("/servicos", service).await?;
        let created: Service = ApiClient::decode(body)?;
        info!(service_id = created.id, tipo = %created.tipo_servico, "service created");
        Ok(created)
    }

    /// Every catalog service. Never fails on an empty backend answer.
    pub async fn list_services(&self) -> ApiResult<Vec<Service>> {
        let body = self.client.get("/servicos").await?;
        let services: Vec<Service> = ApiClient::decode_list(body)?;
        debug!(total = services.len(), "services listed");
        Ok(services)
    }

    /// Advertise a catalog service on behalf of a provider.
    pub async fn link_provider_to_service(
        &self,
        link: &NewProviderLink,
    ) -> ApiResult<ProviderServiceLink> {
        let (usuario_id, servico_id) = link.validate()?;

        let mut body = Map::new();
        body.insert("usuario".to_string(), json!({ "id": usuario_id }));
        body.insert("servico".to_string(), json!({ "id": servico_id }));
        if let Some(price) = link.preco_personalizado {
            body.insert("precoPersonalizado".to_string(), json!(price));
        }
        if let Some(descricao) = link.descricao.as_deref().map(str::trim) {
            if !descricao.is_empty() {
                body.insert("descricao".to_string(), json!(descricao));
            }
        }

        let response = self
            .client
            .post("/usuarios-servicos", &Value::Object(body))
            .await?;
        let reply_id = coerce::record_id(&response);
        let created = match ApiClient::decode::<ProviderServiceLink>(response) {
            Ok(created) => created,
            // the link exists once the backend answered 2xx, whatever the body says
            Err(err) => match reply_id {
                Some(id) => {
                    debug!(link_id = id, "link reply is not a full record: {err}");
                    link.requested_link(id, usuario_id, servico_id)
                }
                None => self.newest_link(usuario_id, servico_id).await?.ok_or(err)?,
            },
        };
        info!(link_id = created.id, usuario_id, servico_id, "provider linked to service");
        Ok(created)
    }

    /// Most recent link of a provider to a service, read back from the backend.
    async fn newest_link(
        &self,
        usuario_id: i64,
        servico_id: i64,
    ) -> ApiResult<Option<ProviderServiceLink>> {
        let links = self
            .list_provider_links(&LinkFilter::by_provider(usuario_id))
            .await?;
        Ok(links
            .into_iter()
            .filter(|link| link.servico.id == servico_id)
            .max_by_key(|link| link.id))
    }

    /// Provider advertisements narrowed by `filter`.
    ///
    /// A provider filter is also sent to the server; both filters are applied
    /// locally whatever the server returns.
    pub async fn list_provider_links(
        &self,
        filter: &LinkFilter,
    ) -> ApiResult<Vec<ProviderServiceLink>> {
        let path = match filter.usuario_id {
            Some(usuario_id) => format!("/usuarios-servicos?usuarioId={usuario_id}"),
            None => "/usuarios-servicos".to_string(),
        };
        let body = self.client.get(&path).await?;
        let links: Vec<ProviderServiceLink> = ApiClient::decode_list(body)?;
        let received = links.len();
        let links: Vec<ProviderServiceLink> =
            links.into_iter().filter(|link| filter.matches(link)).collect();
        debug!(received, kept = links.len(), "provider links listed");
        Ok(links)
    }
}

/// Distinct service types in first-seen order.
pub fn service_types(links: &[ProviderServiceLink]) -> Vec<String> {
    let mut types: Vec<String> = Vec::new();
    for link in links {
        let tipo = &link.servico.tipo_servico;
        if !tipo.is_empty() && !types.contains(tipo) {
            types.push(tipo.clone());
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ApiError, session::MemorySessionStore};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn link_json(id: i64, usuario_id: i64, tipo: &str, preco: Value) -> Value {
        json!({
            "id": id,
            "usuario": { "id": usuario_id, "nome": "Prestador", "email": "p@example.com", "tipo": "fornecedor" },
            "servico": { "id": 10 + id, "descricao": format!("Serviço de {tipo}"), "tipoServico": tipo, "valorHora": 50 },
            "precoPersonalizado": preco,
            "descricao": null
        })
    }

    fn catalog(server: &MockServer) -> ServiceCatalog {
        let store = Arc::new(MemorySessionStore::new());
        ServiceCatalog::new(ApiClient::new(server.uri(), store).expect("client creation"))
    }

    #[tokio::test]
    async fn create_service_posts_catalog_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servicos"))
            .and(body_json(json!({
                "descricao": "Instalação elétrica",
                "tipoServico": "Elétrica",
                "valorHora": 80.0,
                "mensagem": "Atendo aos sábados"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 12,
                "descricao": "Instalação elétrica",
                "tipoServico": "Elétrica",
                "valorHora": 80,
                "mensagem": "Atendo aos sábados"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = catalog(&server)
            .create_service(&NewService {
                descricao: "Instalação elétrica".to_string(),
                tipo_servico: "Elétrica".to_string(),
                valor_hora: 80.0,
                mensagem: "Atendo aos sábados".to_string(),
            })
            .await
            .expect("create");
        assert_eq!(created.id, 12);
        assert_eq!(created.valor_hora, 80.0);
    }

    #[tokio::test]
    async fn invalid_hourly_rate_is_rejected_locally() {
        let server = MockServer::start().await;
        let result = catalog(&server)
            .create_service(&NewService {
                descricao: "Faxina".to_string(),
                tipo_servico: "Limpeza".to_string(),
                valor_hora: -10.0,
                mensagem: String::new(),
            })
            .await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        let requests = server.received_requests().await.expect("recording enabled");
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn empty_listing_is_an_empty_vec() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servicos"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let services = catalog(&server).list_services().await.expect("listing");
        assert!(services.is_empty());
    }

    #[tokio::test]
    async fn link_requires_both_ids() {
        let server = MockServer::start().await;
        let catalog = catalog(&server);
        let missing_service = NewProviderLink {
            usuario_id: Some(2),
            ..NewProviderLink::default()
        };
        assert!(matches!(
            catalog.link_provider_to_service(&missing_service).await,
            Err(ApiError::Validation(_))
        ));
        let missing_user = NewProviderLink {
            servico_id: Some(5),
            ..NewProviderLink::default()
        };
        assert!(matches!(
            catalog.link_provider_to_service(&missing_user).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn link_without_custom_price_uses_catalog_price() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios-servicos"))
            .and(body_json(json!({ "usuario": { "id": 2 }, "servico": { "id": 11 } })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(link_json(1, 2, "Pintura", Value::Null)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let link = catalog(&server)
            .link_provider_to_service(&NewProviderLink {
                usuario_id: Some(2),
                servico_id: Some(11),
                preco_personalizado: None,
                descricao: Some("   ".to_string()),
            })
            .await
            .expect("link");
        assert_eq!(link.preco_personalizado, None);
        assert_eq!(link.effective_price(), 50.0);
    }

    #[tokio::test]
    async fn link_confirmed_by_id_only_is_still_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios-servicos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "31",
                "usuario": { "id": 2 },
                "servico": { "id": 11 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let link = catalog(&server)
            .link_provider_to_service(&NewProviderLink {
                usuario_id: Some(2),
                servico_id: Some(11),
                preco_personalizado: Some(65.0),
                descricao: Some(" Pintura externa ".to_string()),
            })
            .await
            .expect("committed link");
        assert_eq!(link.id, 31);
        assert_eq!(link.usuario.id, 2);
        assert_eq!(link.servico.id, 11);
        assert_eq!(link.effective_price(), 65.0);
        assert_eq!(link.effective_description(), "Pintura externa");
    }

    #[tokio::test]
    async fn link_without_reply_body_is_read_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/usuarios-servicos"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/usuarios-servicos"))
            .and(query_param("usuarioId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                link_json(1, 2, "Pintura", Value::Null),
                link_json(4, 2, "Limpeza", Value::Null),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        // link_json gives link 4 the service id 14
        let link = catalog(&server)
            .link_provider_to_service(&NewProviderLink {
                usuario_id: Some(2),
                servico_id: Some(14),
                ..NewProviderLink::default()
            })
            .await
            .expect("committed link");
        assert_eq!(link.id, 4);
        assert_eq!(link.servico.tipo_servico, "Limpeza");
    }

    #[tokio::test]
    async fn links_filter_by_exact_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios-servicos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                link_json(1, 2, "Pintura", json!("70")),
                link_json(2, 3, "pintura", Value::Null),
                link_json(3, 4, "Limpeza", Value::Null),
                link_json(4, 2, "Pintura", Value::Null),
            ])))
            .mount(&server)
            .await;

        let catalog = catalog(&server);
        let all = catalog
            .list_provider_links(&LinkFilter::default())
            .await
            .expect("listing");
        assert_eq!(all.len(), 4);
        assert_eq!(service_types(&all), vec!["Pintura", "pintura", "Limpeza"]);

        let painting = catalog
            .list_provider_links(&LinkFilter::by_type("Pintura"))
            .await
            .expect("listing");
        let ids: Vec<i64> = painting.iter().map(|link| link.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(painting[0].effective_price(), 70.0);
    }

    #[tokio::test]
    async fn provider_filter_is_sent_and_rechecked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/usuarios-servicos"))
            .and(query_param("usuarioId", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                link_json(1, 2, "Pintura", Value::Null),
                link_json(2, 3, "Limpeza", Value::Null),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let links = catalog(&server)
            .list_provider_links(&LinkFilter::by_provider(2))
            .await
            .expect("listing");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].usuario.id, 2);
    }
}
