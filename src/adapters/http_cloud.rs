//! Cloud registration over the provisioning HTTP API

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CloudError, DfuKeysResult};
use crate::model::{DeviceId, PublicKey};
use crate::ports::CloudRegistrar;

pub const DEFAULT_API_URL: &str = "https://api.particle.io";

/// Error body returned by the API
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    error: Option<String>,
    error_description: Option<String>,
    info: Option<String>,
}

/// Registers device keys with `POST /v1/provisioning/{device_id}`
#[derive(Debug, Clone)]
pub struct HttpCloudRegistrar {
    client: Client,
    api_url: String,
    access_token: Option<String>,
}

impl HttpCloudRegistrar {
    pub fn new(
        api_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> DfuKeysResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dfukeys/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| CloudError::Unavailable {
                message: format!("cannot create HTTP client: {err}"),
            })?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

impl CloudRegistrar for HttpCloudRegistrar {
    fn register_device_key(
        &self,
        device_id: &DeviceId,
        key: &PublicKey,
        product_id: Option<&str>,
    ) -> DfuKeysResult<()> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| CloudError::Unauthorized {
                message: "no access token configured".to_string(),
            })?;
        let public_key = key.to_pem().map_err(|err| CloudError::Unavailable {
            message: format!("cannot encode public key: {err}"),
        })?;

        let order = format!(
            "manual_{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default()
        );
        let mut form = vec![
            ("deviceID", device_id.to_string()),
            ("publicKey", public_key),
            ("order", order),
            ("filename", "cli".to_string()),
            ("algorithm", key.algorithm().cloud_name().to_string()),
        ];
        if let Some(product_id) = product_id {
            form.push(("product_id", product_id.to_string()));
        }

        let url = format!("{}/v1/provisioning/{}", self.api_url, device_id);
        debug!(%url, algorithm = %key.algorithm(), "Registering device key");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .form(&form)
            .send()
            .map_err(|err| CloudError::Unavailable {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            info!(%device_id, "Cloud accepted device key");
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(classify(status, &body).into())
    }
}

/// Map an error response to the cloud's own classification
fn classify(status: StatusCode, body: &str) -> CloudError {
    let parsed: ApiError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.error)
        .or(parsed.info)
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudError::Unauthorized { message },
        StatusCode::NOT_FOUND => CloudError::NotFound { message },
        StatusCode::CONFLICT => CloudError::Conflict { message },
        StatusCode::BAD_REQUEST if is_claimed(&message) => CloudError::Conflict { message },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CloudError::Rejected { message }
        }
        _ => CloudError::Unavailable { message },
    }
}

/// Whether a 400 message says the key or device already belongs to someone
fn is_claimed(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["already", "claimed", "in use"]
        .iter()
        .any(|marker| message.contains(marker))
}
