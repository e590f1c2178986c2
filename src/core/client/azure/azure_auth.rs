use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::config::secret::Secret;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::errors::{DeployerError, DeployerResult};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Secret,
}

/// Bearer token for the resource manager, obtained once via the OAuth2
/// client-credentials grant.
#[derive(Debug, Clone)]
pub struct AzureAuthorizer {
    token: Secret,
}

impl AzureAuthorizer {
    /// Wrap a token obtained elsewhere.
    pub fn from_token(token: impl Into<Secret>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub async fn authorize(
        client: &Client,
        active_directory_endpoint: &str,
        resource_manager_endpoint: &str,
        creds: &CredentialEntity,
    ) -> DeployerResult<Self> {
        let url = format!(
            "{}/{}/oauth2/token",
            active_directory_endpoint.trim_end_matches('/'),
            urlencoding::encode(&creds.tenant_id)
        );
        let resource = format!("{}/", resource_manager_endpoint.trim_end_matches('/'));

        debug!(tenant = %creds.tenant_id, client_id = %creds.client_id, "Requesting management token");

        let resp = client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.expose()),
                ("resource", resource.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                DeployerError::TransientNetwork(format!("token endpoint returned {}: {}", status, text))
            } else {
                DeployerError::Authentication(format!("token endpoint returned {}: {}", status, text))
            });
        }

        let token: TokenResponse = resp.json().await?;
        if token.access_token.is_empty() {
            return Err(DeployerError::Authentication("token endpoint returned an empty token".into()));
        }

        info!(tenant = %creds.tenant_id, "Authorized against resource manager");
        Ok(Self {
            token: token.access_token,
        })
    }

    pub fn bearer(&self) -> &str {
        self.token.expose()
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::core::template::api_model_entity::tests::creds;

    #[tokio::test]
    async fn obtains_token_with_client_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/tenant/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                Matcher::UrlEncoded("client_id".into(), "client-id".into()),
                Matcher::UrlEncoded("resource".into(), "https://management.azure.com/".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"tok-123456789"}"#)
            .create_async()
            .await;

        let auth = AzureAuthorizer::authorize(
            &Client::new(),
            &server.url(),
            "https://management.azure.com",
            &creds(),
        )
        .await
        .unwrap();

        assert_eq!(auth.bearer(), "tok-123456789");
        assert!(!format!("{:?}", auth).contains("tok-123456789"));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_part_of_the_token_is_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/tenant/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-abcdefgh-WXYZ"}"#)
            .create_async()
            .await;

        AzureAuthorizer::authorize(
            &Client::new(),
            &server.url(),
            "https://management.azure.com",
            &creds(),
        )
        .await
        .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Authorized against resource manager"));
        assert!(!output.contains("WXYZ"));
        assert!(!output.contains("client-secret-value"));
    }

    #[tokio::test]
    async fn rejected_credentials_are_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/tenant/oauth2/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let err = AzureAuthorizer::authorize(
            &Client::new(),
            &server.url(),
            "https://management.azure.com",
            &creds(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeployerError::Authentication(ref m) if m.contains("invalid_client")));
    }
}
