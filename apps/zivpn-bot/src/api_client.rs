use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zivpn_core::models::{AccountCreateResult, AccountRecord};
use zivpn_core::{AccountProvider, GatewayError};

/// Client of the local ZiVPN management API.
#[derive(Clone)]
pub struct ZivpnApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Serialize)]
struct AccountRequest<'a> {
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
}

impl ZivpnApiClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        read_envelope(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        read_envelope(resp).await
    }
}

async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<Option<T>, GatewayError> {
    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?;
    decode_envelope(status, &body)
}

fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<T>, GatewayError> {
    let envelope: Envelope<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(GatewayError::Transport(format!("Request failed: {}", status)));
        }
        Err(e) => return Err(GatewayError::Decode(e.to_string())),
    };
    if !envelope.success {
        let message = if envelope.message.is_empty() {
            format!("request refused ({})", status)
        } else {
            envelope.message
        };
        return Err(GatewayError::Rejected(message));
    }
    Ok(envelope.data)
}

fn require<T>(data: Option<T>) -> Result<T, GatewayError> {
    data.ok_or_else(|| GatewayError::Decode("response has no data".to_string()))
}

#[async_trait]
impl AccountProvider for ZivpnApiClient {
    async fn create(&self, password: &str, days: u32) -> Result<AccountCreateResult, GatewayError> {
        let body = AccountRequest {
            password,
            days: Some(days),
        };
        require(self.post("/user/create", &body).await?)
    }

    async fn renew(&self, password: &str, days: u32) -> Result<AccountCreateResult, GatewayError> {
        let body = AccountRequest {
            password,
            days: Some(days),
        };
        require(self.post("/user/renew", &body).await?)
    }

    async fn delete(&self, password: &str) -> Result<(), GatewayError> {
        let body = AccountRequest {
            password,
            days: None,
        };
        let _: Option<serde_json::Value> = self.post("/user/delete", &body).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AccountRecord>, GatewayError> {
        Ok(self.get("/users").await?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_create_yields_account() {
        let body = br#"{"success":true,"message":"ok","data":{"password":"abc","expired":"2026-07-01"}}"#;
        let data: Option<AccountCreateResult> = decode_envelope(StatusCode::OK, body).unwrap();
        let account = require(data).unwrap();
        assert_eq!(account.password, "abc");
        assert_eq!(account.expired, "2026-07-01");
    }

    #[test]
    fn refusal_carries_backend_message() {
        let body = br#"{"success":false,"message":"User already exists"}"#;
        let err = decode_envelope::<AccountCreateResult>(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(m) if m == "User already exists"));
    }

    #[test]
    fn garbage_is_decode_error_unless_http_failed() {
        let err = decode_envelope::<AccountCreateResult>(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));

        let err =
            decode_envelope::<AccountCreateResult>(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }

    #[test]
    fn user_list_tolerates_missing_host() {
        let body = br#"{"success":true,"data":[{"password":"p","expired":"2026-01-01","status":"active"}]}"#;
        let users: Vec<AccountRecord> = decode_envelope(StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].host, "");
    }

    #[test]
    fn delete_body_omits_days() {
        let body = AccountRequest {
            password: "p",
            days: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"password":"p"}"#);
    }
}
