use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ApiSettings, OperationSettings};
use crate::error::RotationError;
use crate::gateway::types::{InstalledCertificate, Operation, OperationStatus, SslCertificate, TargetHttpsProxy};
use crate::gateway::{authorize, check_response};
use crate::resource::{self, ResourceRef};

/// Exposes operations on target HTTPS proxies and SSL certificate resources,
/// routing to the global or regional endpoint family based on the load
/// balancer's scope.
pub struct LoadBalancerGateway {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    operations: OperationSettings,
    lb: ResourceRef,
}

impl LoadBalancerGateway {
    #[must_use]
    pub fn new(
        client: Client,
        api: &ApiSettings,
        operations: OperationSettings,
        lb: ResourceRef,
    ) -> Self {
        Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            auth_token: api.auth_token.clone(),
            operations,
            lb,
        }
    }

    fn scope(&self) -> String {
        if self.lb.is_global() {
            "global".to_string()
        } else {
            format!("regions/{}", self.lb.location)
        }
    }

    fn proxy_url(&self) -> String {
        format!(
            "{}/projects/{}/{}/targetHttpsProxies/{}",
            self.base_url,
            self.lb.project,
            self.scope(),
            self.lb.name
        )
    }

    fn certificates_url(&self) -> String {
        format!(
            "{}/projects/{}/{}/sslCertificates",
            self.base_url,
            self.lb.project,
            self.scope()
        )
    }

    fn operation_wait_url(&self, operation_id: &str) -> String {
        format!(
            "{}/projects/{}/{}/operations/{operation_id}/wait",
            self.base_url,
            self.lb.project,
            self.scope()
        )
    }

    /// Fetches the first SSL certificate attached to the configured load
    /// balancer.
    ///
    /// # Errors
    /// Returns `NotFound` if the proxy does not exist or has no attached
    /// certificates, `RemoteApi` on any other rejection.
    pub async fn first_certificate(&self) -> Result<InstalledCertificate, RotationError> {
        let url = self.proxy_url();
        debug!("GET {url}");
        let response = authorize(self.client.get(&url), self.auth_token.as_deref())
            .send()
            .await?;
        let response = check_response(response, "target HTTPS proxy").await?;
        let proxy: TargetHttpsProxy = response.json().await?;

        // Only the first attached certificate is considered.
        let cert_uri = proxy.ssl_certificates.first().ok_or_else(|| {
            RotationError::NotFound(format!("proxy `{}` has no attached certificates", proxy.name))
        })?;
        let cert_id = resource::parse_resource_id(cert_uri, "sslCertificates").ok_or_else(|| {
            RotationError::NotFound(format!(
                "cannot parse a certificate ID out of `{cert_uri}`"
            ))
        })?;

        let url = format!("{}/{cert_id}", self.certificates_url());
        debug!("GET {url}");
        let response = authorize(self.client.get(&url), self.auth_token.as_deref())
            .send()
            .await?;
        let response = check_response(response, "SSL certificate").await?;
        let cert: SslCertificate = response.json().await?;
        InstalledCertificate::try_from(cert)
    }

    /// Creates a new SSL certificate resource and returns its resource URI.
    ///
    /// # Errors
    /// Returns `RemoteApi` on rejection, `OperationFailed` /
    /// `OperationTimeout` if the associated operation does not complete
    /// cleanly.
    pub async fn create_ssl_certificate(
        &self,
        cert_id: &str,
        private_key_pem: &str,
        cert_chain_pem: &str,
    ) -> Result<String, RotationError> {
        info!("Creating new SSL certificate [{cert_id}]..");
        let body = serde_json::json!({
            "name": cert_id,
            "certificate": cert_chain_pem,
            "privateKey": private_key_pem,
        });

        let url = self.certificates_url();
        let response = authorize(self.client.post(&url), self.auth_token.as_deref())
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .json(&body)
            .send()
            .await?;
        let response = check_response(response, "SSL certificate insert").await?;
        let operation: Operation = response.json().await?;

        self.await_operation(&operation).await?;
        let target = operation.target_link.ok_or_else(|| RotationError::RemoteApi {
            status: 200,
            message: "insert operation carried no targetLink".to_string(),
        })?;
        info!("Created [{target}].");
        Ok(target)
    }

    /// Updates the load balancer to serve exactly the given certificate,
    /// replacing the previous binding.
    ///
    /// # Errors
    /// Returns `RemoteApi` on rejection, `OperationFailed` /
    /// `OperationTimeout` if the associated operation does not complete
    /// cleanly.
    pub async fn set_ssl_certificate(&self, cert_uri: &str) -> Result<(), RotationError> {
        info!("Updating load balancer [{}] with new certificate..", self.lb.name);
        let body = serde_json::json!({ "sslCertificates": [cert_uri] });

        let url = format!("{}/setSslCertificates", self.proxy_url());
        let response = authorize(self.client.post(&url), self.auth_token.as_deref())
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .json(&body)
            .send()
            .await?;
        let response = check_response(response, "proxy certificate update").await?;
        let operation: Operation = response.json().await?;

        self.await_operation(&operation).await?;
        info!("Updated [{}].", self.lb.name);
        Ok(())
    }

    /// Deletes the named SSL certificate resource.
    ///
    /// # Errors
    /// Returns `RemoteApi` on rejection, `OperationFailed` /
    /// `OperationTimeout` if the associated operation does not complete
    /// cleanly.
    pub async fn delete_ssl_certificate(&self, cert_id: &str) -> Result<(), RotationError> {
        info!("Deleting old SSL certificate [{cert_id}]..");
        let url = format!("{}/{cert_id}", self.certificates_url());
        let response = authorize(self.client.delete(&url), self.auth_token.as_deref())
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .send()
            .await?;
        let response = check_response(response, "SSL certificate delete").await?;
        let operation: Operation = response.json().await?;

        self.await_operation(&operation).await?;
        info!("Deleted [{cert_id}].");
        Ok(())
    }

    /// Waits for the given operation to reach a terminal state, polling the
    /// scope-appropriate wait endpoint with capped exponential backoff.
    ///
    /// # Errors
    /// Returns `OperationFailed` if the operation finishes with an error
    /// status, `OperationTimeout` when the poll budget is exhausted.
    pub async fn await_operation(&self, operation: &Operation) -> Result<(), RotationError> {
        if let Some(result) = terminal_result(operation) {
            return result;
        }

        let operation_id = resource::parse_resource_id(&operation.self_link, "operations")
            .ok_or_else(|| {
                RotationError::NotFound(format!(
                    "cannot parse an operation ID out of `{}`",
                    operation.self_link
                ))
            })?;
        info!("Awaiting operation `{operation_id}`..");

        let url = self.operation_wait_url(operation_id);
        let mut delay_secs = self.operations.poll_base_delay_secs;
        for attempt in 1..=self.operations.poll_attempts {
            debug!("POST {url} (attempt {attempt})");
            let response = authorize(self.client.post(&url), self.auth_token.as_deref())
                .send()
                .await?;
            let response = check_response(response, "operation wait").await?;
            let polled: Operation = response.json().await?;

            if let Some(result) = terminal_result(&polled) {
                return result;
            }

            if attempt < self.operations.poll_attempts {
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                delay_secs = delay_secs
                    .saturating_mul(2)
                    .min(self.operations.poll_max_delay_secs);
            }
        }

        Err(RotationError::OperationTimeout {
            name: operation_id.to_string(),
            attempts: self.operations.poll_attempts,
        })
    }
}

fn terminal_result(operation: &Operation) -> Option<Result<(), RotationError>> {
    if operation.status != OperationStatus::Done {
        return None;
    }
    match operation.error_summary() {
        Some(message) => Some(Err(RotationError::OperationFailed {
            name: operation.name.clone(),
            message,
        })),
        None => Some(Ok(())),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_operations() -> OperationSettings {
        OperationSettings {
            poll_attempts: 3,
            poll_base_delay_secs: 0,
            poll_max_delay_secs: 0,
        }
    }

    fn gateway(server: &MockServer, location: &str) -> LoadBalancerGateway {
        LoadBalancerGateway::new(
            Client::new(),
            &ApiSettings {
                base_url: server.uri(),
                auth_token: None,
            },
            test_operations(),
            ResourceRef {
                project: "my-project".to_string(),
                location: location.to_string(),
                name: "my-lb".to_string(),
            },
        )
    }

    fn cert_body(server: &MockServer) -> serde_json::Value {
        serde_json::json!({
            "name": "cert-old",
            "selfLink": format!("{}/projects/my-project/global/sslCertificates/cert-old", server.uri()),
            "type": "SELF_MANAGED",
            "creationTimestamp": "2021-01-01T00:00:00Z",
            "expireTime": "2021-04-01T00:00:00Z",
        })
    }

    fn done_operation(server: &MockServer, name: &str) -> serde_json::Value {
        serde_json::json!({
            "name": name,
            "selfLink": format!("{}/projects/my-project/global/operations/{name}", server.uri()),
            "status": "DONE",
        })
    }

    #[tokio::test]
    async fn test_first_certificate_global_routing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/targetHttpsProxies/my-lb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "my-lb",
                "sslCertificates": [
                    format!("{}/projects/my-project/global/sslCertificates/cert-old", server.uri())
                ],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/sslCertificates/cert-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cert_body(&server)))
            .mount(&server)
            .await;

        let cert = gateway(&server, "global").first_certificate().await.unwrap();
        assert_eq!(cert.name, "cert-old");
        assert_eq!(cert.not_after.year(), 2021);
    }

    #[tokio::test]
    async fn test_first_certificate_regional_routing() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(
                "/projects/my-project/regions/us-central1/targetHttpsProxies/my-lb",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "my-lb",
                "sslCertificates": [
                    format!("{}/projects/my-project/regions/us-central1/sslCertificates/cert-old", server.uri())
                ],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/projects/my-project/regions/us-central1/sslCertificates/cert-old",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(cert_body(&server)))
            .mount(&server)
            .await;

        let cert = gateway(&server, "us-central1")
            .first_certificate()
            .await
            .unwrap();
        assert_eq!(cert.name, "cert-old");
    }

    #[tokio::test]
    async fn test_first_certificate_empty_attachment_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/targetHttpsProxies/my-lb"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "my-lb",
                "sslCertificates": [],
            })))
            .mount(&server)
            .await;

        let err = gateway(&server, "global")
            .first_certificate()
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_first_certificate_missing_proxy_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects/my-project/global/targetHttpsProxies/my-lb"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = gateway(&server, "global")
            .first_certificate()
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_ssl_certificate_awaits_operation() {
        let server = MockServer::start().await;
        let target = format!(
            "{}/projects/my-project/global/sslCertificates/auto-new",
            server.uri()
        );

        let mut insert_op = done_operation(&server, "op-ins");
        insert_op["status"] = serde_json::json!("RUNNING");
        insert_op["targetLink"] = serde_json::json!(target.clone());
        Mock::given(method("POST"))
            .and(path("/projects/my-project/global/sslCertificates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(insert_op))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/my-project/global/operations/op-ins/wait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation(&server, "op-ins")))
            .mount(&server)
            .await;

        let uri = gateway(&server, "global")
            .create_ssl_certificate("auto-new", "PRIVATE", "CHAIN")
            .await
            .unwrap();
        assert_eq!(uri, target);

        // Every mutating request carries a fresh idempotency token.
        let requests = server.received_requests().await.unwrap();
        let insert = requests
            .iter()
            .find(|r| r.url.path() == "/projects/my-project/global/sslCertificates")
            .unwrap();
        assert!(insert.url.query().unwrap_or_default().contains("requestId="));
    }

    #[tokio::test]
    async fn test_await_operation_surfaces_error_status() {
        let server = MockServer::start().await;

        let mut failed = done_operation(&server, "op-bad");
        failed["error"] = serde_json::json!({
            "errors": [{"code": "QUOTA_EXCEEDED", "message": "too many certificates"}]
        });
        Mock::given(method("POST"))
            .and(path("/projects/my-project/global/operations/op-bad/wait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(failed))
            .mount(&server)
            .await;

        let pending: Operation = serde_json::from_value(serde_json::json!({
            "name": "op-bad",
            "selfLink": format!("{}/projects/my-project/global/operations/op-bad", server.uri()),
            "status": "PENDING",
        }))
        .unwrap();

        let err = gateway(&server, "global")
            .await_operation(&pending)
            .await
            .unwrap_err();
        match err {
            RotationError::OperationFailed { name, message } => {
                assert_eq!(name, "op-bad");
                assert!(message.contains("QUOTA_EXCEEDED"));
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_await_operation_times_out() {
        let server = MockServer::start().await;

        let mut running = done_operation(&server, "op-slow");
        running["status"] = serde_json::json!("RUNNING");
        Mock::given(method("POST"))
            .and(path("/projects/my-project/global/operations/op-slow/wait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(running.clone()))
            .mount(&server)
            .await;

        let pending: Operation = serde_json::from_value(running).unwrap();
        let err = gateway(&server, "global")
            .await_operation(&pending)
            .await
            .unwrap_err();
        match err {
            RotationError::OperationTimeout { name, attempts } => {
                assert_eq!(name, "op-slow");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected OperationTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_ssl_certificate_replaces_binding() {
        let server = MockServer::start().await;

        let mut op = done_operation(&server, "op-set");
        op["status"] = serde_json::json!("RUNNING");
        Mock::given(method("POST"))
            .and(path(
                "/projects/my-project/global/targetHttpsProxies/my-lb/setSslCertificates",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(op))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/projects/my-project/global/operations/op-set/wait"))
            .respond_with(ResponseTemplate::new(200).set_body_json(done_operation(&server, "op-set")))
            .mount(&server)
            .await;

        gateway(&server, "global")
            .set_ssl_certificate("https://example.test/sslCertificates/auto-new")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let update = requests
            .iter()
            .find(|r| r.url.path().ends_with("/setSslCertificates"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&update.body).unwrap();
        assert_eq!(
            body["sslCertificates"],
            serde_json::json!(["https://example.test/sslCertificates/auto-new"])
        );
    }
}
