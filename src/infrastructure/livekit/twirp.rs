//! Minimal Twirp JSON client for the LiveKit server API

use crate::application::ports::ControlError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const TWIRP_PREFIX: &str = "/twirp";

/// Map a `ws(s)://` server URL to the `http(s)://` URL the API is served on
pub fn http_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    }
}

/// Error body returned by a Twirp server
#[derive(Debug, Default, Deserialize)]
struct TwirpErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    meta: HashMap<String, String>,
}

/// Turn a non-2xx Twirp response into a [`ControlError`]
pub fn decode_error(status: u16, body: &str) -> ControlError {
    match serde_json::from_str::<TwirpErrorBody>(body) {
        Ok(mut error) => ControlError::Rejected {
            code: if error.code.is_empty() {
                status.to_string()
            } else {
                error.code
            },
            message: error.msg,
            sip_status_code: error.meta.remove("sip_status_code"),
            sip_status: error.meta.remove("sip_status"),
        },
        Err(_) => ControlError::Rejected {
            code: status.to_string(),
            message: body.trim().to_string(),
            sip_status_code: None,
            sip_status: None,
        },
    }
}

#[derive(Debug, Clone)]
pub struct TwirpClient {
    http: reqwest::Client,
    base_url: String,
}

impl TwirpClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlError::Transport(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: http_base_url(url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call `service/method` with a JSON body, authorised by `token`
    pub async fn call<Req, Resp>(
        &self,
        service: &str,
        method: &str,
        token: &str,
        body: &Req,
    ) -> Result<Resp, ControlError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}/{}/{}", self.base_url, TWIRP_PREFIX, service, method);
        debug!("Twirp call {}", url);

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &text));
        }

        // Empty messages may come back as an empty body
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text)
            .map_err(|e| ControlError::Transport(format!("Invalid {} response: {}", method, e)))
    }
}
