//! Credential issuer client
//!
//! The issuer creates an API consumer for a user and, when given the user's
//! wallet address, returns the signed payload that authorizes registering
//! the consumer's key hash on chain.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::BindingPayload;
use crate::error::WalletError;

const APPLICATION: &str = "hub";

#[derive(Clone)]
pub struct IssuerConfig {
    pub admin_url: String,
    pub username: String,
    pub password: String,
    pub app_id: String,
    pub initial_quota: f64,
}

impl fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("admin_url", &self.admin_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("initial_quota", &self.initial_quota)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CreateConsumerRequest<'a> {
    username: &'a str,
    custom_id: &'a str,
    quota: f64,
    application: &'a str,
    #[serde(rename = "userAddress")]
    user_address: Address,
}

#[derive(Debug, Deserialize)]
struct ConsumerRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateConsumerResponse {
    consumer: ConsumerRef,
    api_key: String,
    #[serde(default)]
    onchain: Option<BindingPayload>,
}

/// Consumer created by the issuer
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub consumer_id: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub onchain: Option<BindingPayload>,
}

#[derive(Debug, Clone)]
pub struct IssuerClient {
    config: IssuerConfig,
    client: reqwest::Client,
}

impl IssuerClient {
    pub fn new(config: IssuerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// `POST {admin_url}/consumers`
    pub async fn create_consumer(
        &self,
        user_id: &str,
        user_address: Address,
    ) -> Result<IssuedCredential, WalletError> {
        let url = format!("{}/consumers", self.config.admin_url.trim_end_matches('/'));
        let request = CreateConsumerRequest {
            username: user_id,
            custom_id: &self.config.app_id,
            quota: self.config.initial_quota,
            application: APPLICATION,
            user_address,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Issuer(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::Issuer(format!("{} - {}", status, body)));
        }

        let created: CreateConsumerResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Issuer(format!("malformed consumer response: {}", e)))?;

        log::info!(
            "Issuer created consumer {} for user {} (onchain payload: {})",
            created.consumer.id,
            user_id,
            created.onchain.is_some()
        );

        Ok(IssuedCredential {
            consumer_id: created.consumer.id,
            api_key: created.api_key,
            onchain: created.onchain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_issuer(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/admin", addr)
    }

    fn config(admin_url: String) -> IssuerConfig {
        IssuerConfig {
            admin_url,
            username: "admin".to_string(),
            password: "secret".to_string(),
            app_id: "hpp-hub".to_string(),
            initial_quota: 10.0,
        }
    }

    #[tokio::test]
    async fn test_create_consumer_returns_payload() {
        let app = Router::new().route(
            "/admin/consumers",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert!(headers.contains_key("authorization"));
                assert_eq!(body["custom_id"], "hpp-hub");
                assert_eq!(body["application"], "hub");
                Json(json!({
                    "consumer": { "id": "c-1", "username": body["username"] },
                    "api_key": "hpph_test",
                    "quota": 10,
                    "onchain": {
                        "keyHash": format!("0x{}", "11".repeat(32)),
                        "signature": "0xabcd",
                        "contractAddress": "0x35f395b7554041DB56923B9375f653C0DbA60412"
                    }
                }))
            }),
        );
        let client = IssuerClient::new(config(spawn_issuer(app).await));

        let issued = client
            .create_consumer("alice", Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(issued.consumer_id, "c-1");
        assert_eq!(issued.api_key, "hpph_test");
        assert!(issued.onchain.is_some());
    }

    #[tokio::test]
    async fn test_error_status_is_an_issuer_error() {
        let app = Router::new().route(
            "/admin/consumers",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad credentials") }),
        );
        let client = IssuerClient::new(config(spawn_issuer(app).await));

        let err = client
            .create_consumer("alice", Address::repeat_byte(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Issuer(msg) if msg.contains("401")));
    }
}
