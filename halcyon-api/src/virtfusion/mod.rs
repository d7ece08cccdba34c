//! Thin client for the VirtFusion control plane. Every server-side effect
//! (power, suspension, ownership, provisioning) happens there; this module
//! only assembles requests and shapes responses.

pub mod models;

use std::time::Duration;

use halcyon::{Endpoint, HttpMethod, ValidatedAction};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use self::models::{
    Envelope, Hypervisor, IpBlock, OsTemplate, PageEnvelope, Server, ServerPage, VfHypervisor,
    VfIpBlock, VfServer, VfTemplateGroup, VfUser,
};

#[derive(Debug, thiserror::Error)]
pub enum VfError {
    #[error("Resource not found on the control plane")]
    NotFound,

    #[error("VirtFusion error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("VirtFusion transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected VirtFusion response: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct VirtFusionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl VirtFusionClient {
    pub fn new(http: reqwest::Client, base_url: &str, token: &str, timeout_secs: u64) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pulls a human-readable message out of an error body. VirtFusion uses
    /// `errors: [..]`, `msg` or `message` depending on the endpoint.
    fn error_message(status: StatusCode, body: &str) -> String {
        if let Ok(v) = serde_json::from_str::<Value>(body) {
            if let Some(errors) = v.get("errors").and_then(|e| e.as_array()) {
                let joined = errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                if !joined.is_empty() {
                    return joined;
                }
            }
            for key in ["msg", "message", "error"] {
                if let Some(m) = v.get(key).and_then(|m| m.as_str()) {
                    return m.to_string();
                }
            }
        }
        if body.trim().is_empty() {
            format!("Control plane returned {status}")
        } else {
            body.trim().to_string()
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, VfError> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(&self.token)
            .header("accept", "application/json")
            .timeout(self.timeout);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            return Err(VfError::NotFound);
        }
        if !status.is_success() {
            let message = Self::error_message(status, &text);
            tracing::warn!(%method, path, status = status.as_u16(), "VirtFusion call failed: {message}");
            return Err(VfError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VfError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, VfError> {
        self.fetch(Method::GET, path, None).await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, VfError> {
        let value = self
            .send(method, path, body)
            .await?
            .ok_or_else(|| VfError::Decode(format!("empty body from {path}")))?;
        serde_json::from_value(value).map_err(|e| VfError::Decode(e.to_string()))
    }

    /// Sends the request an [`Endpoint`] describes, discarding the body.
    pub async fn call(&self, endpoint: &Endpoint) -> Result<(), VfError> {
        let method = match endpoint.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        };
        self.send(method, &endpoint.path, None).await.map(|_| ())
    }

    // ─── Servers ─────────────────────────────────────────

    pub async fn list_servers(&self, page: i64, per_page: i64) -> Result<ServerPage, VfError> {
        let env: PageEnvelope<VfServer> = self
            .get(&format!("/servers?results={per_page}&page={page}"))
            .await?;
        let data: Vec<Server> = env.data.into_iter().map(Server::from).collect();
        Ok(ServerPage {
            total: env.total.map(|t| t as i64).unwrap_or(data.len() as i64),
            page: env.current_page.map(|p| p as i64).unwrap_or(page),
            per_page: env.per_page.map(|p| p as i64).unwrap_or(per_page),
            data,
        })
    }

    pub async fn get_server(&self, server_id: u64) -> Result<Server, VfError> {
        let env: Envelope<VfServer> = self.get(&format!("/servers/{server_id}")).await?;
        Ok(env.data.into())
    }

    pub async fn list_user_servers(&self, vf_user_id: u64) -> Result<Vec<Server>, VfError> {
        let env: Envelope<Vec<VfServer>> =
            self.get(&format!("/servers/user/{vf_user_id}")).await?;
        Ok(env.data.into_iter().map(Server::from).collect())
    }

    pub async fn perform(&self, server_id: u64, action: &ValidatedAction) -> Result<(), VfError> {
        let endpoint = action
            .control_plane_endpoint(server_id)
            .map_err(|e| VfError::Decode(e.to_string()))?;
        tracing::info!(
            server_id,
            action = %action.action,
            method = %endpoint.method,
            path = %endpoint.path,
            "Dispatching server action"
        );
        self.call(&endpoint).await
    }

    pub async fn create_server(
        &self,
        package_id: i64,
        vf_user_id: u64,
        hypervisor_group_id: i64,
    ) -> Result<Server, VfError> {
        let body = json!({
            "packageId": package_id,
            "userId": vf_user_id,
            "hypervisorId": hypervisor_group_id,
            "ipv4": 1,
        });
        let env: Envelope<VfServer> = self.fetch(Method::POST, "/servers", Some(&body)).await?;
        Ok(env.data.into())
    }

    pub async fn build_server(
        &self,
        server_id: u64,
        template_id: u64,
        hostname: &str,
        ssh_keys: &[i64],
    ) -> Result<(), VfError> {
        let body = json!({
            "operatingSystemId": template_id,
            "name": hostname,
            "hostname": hostname,
            "sshKeys": ssh_keys,
            "email": true,
        });
        self.send(Method::POST, &format!("/servers/{server_id}/build"), Some(&body))
            .await
            .map(|_| ())
    }

    // ─── Infrastructure ──────────────────────────────────

    pub async fn list_hypervisors(&self) -> Result<Vec<Hypervisor>, VfError> {
        let env: Envelope<Vec<VfHypervisor>> = self.get("/compute/hypervisors").await?;
        Ok(env.data.into_iter().map(Hypervisor::from).collect())
    }

    pub async fn list_ip_blocks(&self) -> Result<Vec<IpBlock>, VfError> {
        let env: Envelope<Vec<VfIpBlock>> = self.get("/connectivity/ipblocks").await?;
        Ok(env.data.into_iter().map(IpBlock::from).collect())
    }

    pub async fn list_templates(&self, package_id: i64) -> Result<Vec<OsTemplate>, VfError> {
        let env: Envelope<Vec<VfTemplateGroup>> = self
            .get(&format!("/media/templates/fromServerPackageSpec/{package_id}"))
            .await?;
        Ok(env
            .data
            .into_iter()
            .flat_map(|group| {
                let group_name = group.name;
                group.templates.into_iter().map(move |t| OsTemplate {
                    id: t.id,
                    group: group_name.clone(),
                    name: t.name,
                    version: t.version,
                    variant: t.variant,
                })
            })
            .collect())
    }

    // ─── Users ───────────────────────────────────────────

    pub async fn find_user_by_ext(&self, ext_id: i64) -> Result<Option<VfUser>, VfError> {
        match self
            .get::<Envelope<VfUser>>(&format!("/users/{ext_id}/byExtRelation"))
            .await
        {
            Ok(env) => Ok(Some(env.data)),
            Err(VfError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_user(&self, name: &str, email: &str, ext_id: i64) -> Result<VfUser, VfError> {
        let body = json!({
            "name": name,
            "email": email,
            "extRelationId": ext_id,
            "sendMail": false,
        });
        let env: Envelope<VfUser> = self.fetch(Method::POST, "/users", Some(&body)).await?;
        Ok(env.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halcyon::ServerAction;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> VirtFusionClient {
        VirtFusionClient::new(reqwest::Client::new(), &server.uri(), "vf-token", 5)
    }

    #[tokio::test]
    async fn test_power_action_hits_boot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/12/power/boot"))
            .and(header("authorization", "Bearer vf-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let action = ValidatedAction::new(ServerAction::Start, None, None).unwrap();
        client(&server).perform(12, &action).await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_uses_put_owner() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/servers/12/owner/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let action =
            ValidatedAction::new(ServerAction::Transfer, Some("account merge"), Some(77)).unwrap();
        client(&server).perform(12, &action).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_passes_delay() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/servers/5"))
            .and(query_param("delay", "5"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let action = ValidatedAction::new(ServerAction::Delete, Some("abuse"), None).unwrap();
        client(&server).perform(5, &action).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/3/suspend"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(json!({"errors": ["server is already suspended"]})),
            )
            .mount(&server)
            .await;

        let action = ValidatedAction::new(ServerAction::Suspend, Some("unpaid"), None).unwrap();
        let err = client(&server).perform(3, &action).await.unwrap_err();
        match err {
            VfError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "server is already suspended");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_maps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).get_server(404).await.unwrap_err();
        assert!(matches!(err, VfError::NotFound));
    }

    #[tokio::test]
    async fn test_list_servers_shapes_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("page", "2"))
            .and(query_param("results", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current_page": 2,
                "per_page": 10,
                "total": 11,
                "data": [ { "id": 11, "name": "db", "state": "stopped", "suspended": true } ]
            })))
            .mount(&server)
            .await;

        let page = client(&server).list_servers(2, 10).await.unwrap();
        assert_eq!(page.total, 11);
        assert_eq!(page.page, 2);
        assert_eq!(page.data.len(), 1);
        assert!(page.data[0].suspended);
        assert_eq!(page.data[0].status, "stopped");
    }

    #[tokio::test]
    async fn test_templates_are_flattened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/templates/fromServerPackageSpec/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "name": "Debian", "templates": [ { "id": 1, "name": "Debian", "version": "12" } ] },
                    { "name": "Ubuntu", "templates": [
                        { "id": 2, "name": "Ubuntu", "version": "22.04" },
                        { "id": 3, "name": "Ubuntu", "version": "24.04" }
                    ] }
                ]
            })))
            .mount(&server)
            .await;

        let templates = client(&server).list_templates(4).await.unwrap();
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[2].group, "Ubuntu");
        assert_eq!(templates[2].version.as_deref(), Some("24.04"));
    }

    #[tokio::test]
    async fn test_find_user_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/8/byExtRelation"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).find_user_by_ext(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_server_sends_package_and_owner() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers"))
            .and(body_partial_json(json!({"packageId": 3, "userId": 21, "hypervisorId": 2})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": 500, "ownerId": 21, "name": "pending" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server).create_server(3, 21, 2).await.unwrap();
        assert_eq!(created.id, 500);
        assert_eq!(created.owner_id, Some(21));
    }

    #[test]
    fn test_error_message_fallbacks() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(VirtFusionClient::error_message(status, r#"{"msg":"nope"}"#), "nope");
        assert_eq!(VirtFusionClient::error_message(status, "plain text"), "plain text");
        assert_eq!(
            VirtFusionClient::error_message(status, ""),
            "Control plane returned 400 Bad Request"
        );
    }
}
