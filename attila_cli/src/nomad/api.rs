use std::fs;

use reqwest::{Certificate, Identity, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use url::Url;

use attila_definitions::job::{
    AgentMembers, Allocation, Job, JobPlanResponse, JobRegisterResponse, NodeListStub,
};
use attila_definitions::Region;

use crate::{ErrorKind, Result, ResultExt};

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// An HTTP client for one region's API, built from its stored spec: the
/// default (or first) endpoint address, the optional bearer token and any
/// TLS material.
#[derive(Debug)]
pub struct Client {
    address: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl Client {
    pub fn new(region: &Region) -> Result<Client> {
        let address = Url::parse(region.default_or_first_address())
            .chain_err(|| format!("failed to parse region '{}' API address", region.name))?;

        let mut builder = reqwest::Client::builder();

        if let Some(tls) = &region.tls {
            if !tls.ca_cert.is_empty() {
                let pem = fs::read(&tls.ca_cert)
                    .chain_err(|| format!("failed to read CA cert '{}'", tls.ca_cert))?;
                builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
            }
            if !tls.client_cert.is_empty() && !tls.client_key.is_empty() {
                let mut pem = fs::read(&tls.client_cert)
                    .chain_err(|| format!("failed to read client cert '{}'", tls.client_cert))?;
                pem.extend(
                    fs::read(&tls.client_key)
                        .chain_err(|| format!("failed to read client key '{}'", tls.client_key))?,
                );
                builder = builder.identity(Identity::from_pem(&pem)?);
            }
            if tls.insecure {
                builder = builder.danger_accept_invalid_certs(true);
            }
            if !tls.server_name.is_empty() {
                // rustls offers no SNI override hook; record the intent
                warn!(
                    "region '{}' sets tls server_name '{}' which the transport cannot apply",
                    region.name, tls.server_name
                );
            }
        }

        let token = region
            .auth
            .as_ref()
            .map(|a| a.token.clone())
            .filter(|t| !t.is_empty());

        Ok(Client {
            address,
            token,
            http: builder.build()?,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.address.join(path)?;
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        Ok(builder)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(ErrorKind::UnexpectedHttpStatus(status, body));
        }
        Ok(resp.json().await?)
    }

    pub async fn agent_members(&self) -> Result<AgentMembers> {
        self.send(self.request(Method::GET, "/v1/agent/members")?)
            .await
    }

    /// List nodes with their resource detail included.
    pub async fn node_list(&self) -> Result<Vec<NodeListStub>> {
        let builder = self
            .request(Method::GET, "/v1/nodes")?
            .query(&[("resources", "true")]);
        self.send(builder).await
    }

    pub async fn node_allocations(&self, node_id: &str) -> Result<Vec<Allocation>> {
        self.send(self.request(Method::GET, &format!("/v1/node/{}/allocations", node_id))?)
            .await
    }

    pub async fn namespace_list(&self) -> Result<Vec<Value>> {
        self.send(self.request(Method::GET, "/v1/namespaces")?)
            .await
    }

    pub async fn node_pool_list(&self) -> Result<Vec<Value>> {
        self.send(self.request(Method::GET, "/v1/node/pools")?)
            .await
    }

    /// Dry-run the job against the region's scheduler. The response carries
    /// the `JobModifyIndex` asserted at register time.
    pub async fn job_plan(&self, job: &Job) -> Result<JobPlanResponse> {
        let builder = self
            .request(Method::PUT, &format!("/v1/job/{}/plan", job.id))?
            .json(&json!({ "Job": job, "Diff": false }));
        self.send(builder).await
    }

    /// Register the job, enforcing the modify index captured at plan time.
    pub async fn job_register(
        &self,
        job: &Job,
        modify_index: u64,
    ) -> Result<JobRegisterResponse> {
        let builder = self.request(Method::PUT, "/v1/jobs")?.json(&json!({
            "Job": job,
            "EnforceIndex": true,
            "JobModifyIndex": modify_index,
        }));
        self.send(builder).await
    }
}
