use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zivpn_core::models::{OrderRequest, PaymentArtifact, PaymentStatusResult};
use zivpn_core::{GatewayError, PaymentGateway};

/// Pakasir QRIS payments.
pub struct PakasirGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    project: &'a str,
    order_id: &'a str,
    amount: u64,
}

#[derive(Deserialize)]
struct CreateResponse {
    payment: Option<PaymentArtifact>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
}

impl PakasirGateway {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    fn status_url(&self, order_id: &str) -> String {
        format!(
            "{}/transactionstatus?order_id={}",
            self.base_url,
            urlencoding::encode(order_id)
        )
    }
}

fn parse_created(body: &[u8]) -> Result<PaymentArtifact, GatewayError> {
    let parsed: CreateResponse =
        serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    match parsed.payment {
        Some(artifact) if !artifact.qris_image.is_empty() => Ok(artifact),
        _ => Err(GatewayError::Rejected(format!(
            "no QRIS image in response: {}",
            String::from_utf8_lossy(body)
        ))),
    }
}

fn parse_status(body: &[u8]) -> Result<PaymentStatusResult, GatewayError> {
    let parsed: StatusResponse =
        serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    Ok(PaymentStatusResult {
        settled: parsed.status.eq_ignore_ascii_case("paid"),
    })
}

#[async_trait]
impl PaymentGateway for PakasirGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<PaymentArtifact, GatewayError> {
        let url = format!("{}/transactioncreate/{}", self.base_url, request.method);
        let body = CreateBody {
            project: &request.project,
            order_id: &request.order_id,
            amount: request.amount,
        };
        let resp = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        parse_created(&bytes)
    }

    async fn status(&self, order_id: &str) -> Result<PaymentStatusResult, GatewayError> {
        let resp = self
            .authorize(self.client.get(self.status_url(order_id)))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "Status request failed: {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        parse_status(&bytes)
    }

    fn name(&self) -> &str {
        "pakasir"
    }
}
