use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::errors::{classify_status, DeployerError, DeployerResult, RemoteCall};

use super::azure_auth::AzureAuthorizer;

/// Raw control-plane reply; status handling is left to the caller.
#[derive(Debug)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ArmResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_error(self, call: RemoteCall) -> DeployerError {
        classify_status(self.status, &self.body, call)
    }

    /// Body as JSON, or the classified error for a non-success status.
    pub fn into_json(self, call: RemoteCall) -> DeployerResult<Value> {
        if !self.is_success() {
            return Err(self.into_error(call));
        }
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Subscription-scoped resource manager REST client.
#[derive(Debug, Clone)]
pub struct ArmHttp {
    client: Client,
    endpoint: String,
    subscription_id: String,
    auth: AzureAuthorizer,
}

impl ArmHttp {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        subscription_id: impl Into<String>,
        auth: AzureAuthorizer,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            subscription_id: subscription_id.into(),
            auth,
        }
    }

    /// `/subscriptions/{id}/resourcegroups/{rg}` followed by `tail`.
    pub fn resource_group_path(&self, resource_group: &str, tail: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}{}",
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(resource_group),
            tail
        )
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> DeployerResult<ArmResponse> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(method = %method, url = %url, "Control plane request");

        let mut req = self
            .client
            .request(method, &url)
            .query(&[("api-version", api_version)])
            .bearer_auth(self.auth.bearer());
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(ArmResponse { status, body })
    }
}

/// Encode a single path segment.
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
