use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::Form;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::session::GatewaySession;

const DECODE_FALLBACK_NOTE: &str = "Request succeeded but the response is not JSON.";

/// What a success status turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessBody {
    /// Decode JSON; a non-JSON body becomes `{message, raw_response}`.
    Decode { note: String },
    /// Return `{message}` and ignore the body entirely.
    Acknowledge { message: String },
    /// Empty body acknowledges, JSON decodes, anything else acknowledges
    /// with `non_json_message`.
    DecodeOrAcknowledge {
        message: String,
        non_json_message: String,
    },
}

impl Default for SuccessBody {
    fn default() -> Self {
        SuccessBody::Decode {
            note: DECODE_FALLBACK_NOTE.to_string(),
        }
    }
}

enum CallBody {
    Empty,
    Json(Value),
    Multipart(Form),
}

/// One request against the gateway, relative to the session base URL.
pub struct GatewayCall {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: CallBody,
    success_codes: &'static [u16],
    on_success: SuccessBody,
}

impl GatewayCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: CallBody::Empty,
            success_codes: &[200],
            on_success: SuccessBody::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn json<T: Serialize>(mut self, payload: &T) -> Result<Self, ToolError> {
        self.body = CallBody::Json(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn multipart(mut self, form: Form) -> Self {
        self.body = CallBody::Multipart(form);
        self
    }

    pub fn success_codes(mut self, codes: &'static [u16]) -> Self {
        self.success_codes = codes;
        self
    }

    pub fn on_success(mut self, on_success: SuccessBody) -> Self {
        self.on_success = on_success;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path plus percent-encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new(crate::util::client())
    }
}

impl GatewayClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn send(
        &self,
        session: &GatewaySession,
        call: GatewayCall,
    ) -> Result<Value, ToolError> {
        let target = format!("{}{}", session.base_url(), call.path_and_query());
        let url = reqwest::Url::parse(&target).map_err(|source| ToolError::InvalidUrl {
            url: target.clone(),
            source,
        })?;

        tracing::debug!(method = %call.method, url = %url, "sending gateway request");

        let mut request = self
            .http
            .request(call.method.clone(), url)
            .header(AUTHORIZATION, session.auth_header_value())
            .header(ACCEPT, "application/json");
        request = match call.body {
            CallBody::Empty => request,
            CallBody::Json(body) => request.json(&body),
            // reqwest sets the multipart Content-Type with its boundary
            CallBody::Multipart(form) => request.multipart(form),
        };

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, url = %target, "gateway request failed");
            ToolError::Transport(e)
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            tracing::warn!(error = %e, url = %target, status, "failed to read gateway response body");
            ToolError::Transport(e)
        })?;

        classify_response(status, &text, call.success_codes, &call.on_success)
    }
}

pub fn classify_response(
    status: u16,
    text: &str,
    success_codes: &[u16],
    on_success: &SuccessBody,
) -> Result<Value, ToolError> {
    if !success_codes.contains(&status) {
        tracing::warn!(status, "gateway returned non-success status");
        return Err(ToolError::Status {
            status,
            body: text.to_string(),
        });
    }

    Ok(match on_success {
        SuccessBody::Decode { note } => serde_json::from_str(text).unwrap_or_else(|_| {
            json!({
                "message": note,
                "raw_response": text,
            })
        }),
        SuccessBody::Acknowledge { message } => json!({ "message": message }),
        SuccessBody::DecodeOrAcknowledge {
            message,
            non_json_message,
        } => {
            if text.is_empty() {
                json!({ "message": message })
            } else {
                serde_json::from_str(text).unwrap_or_else(|_| json!({ "message": non_json_message }))
            }
        }
    })
}
