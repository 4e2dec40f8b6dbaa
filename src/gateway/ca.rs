use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ApiSettings, ProfileSettings};
use crate::error::RotationError;
use crate::gateway::types::IssuedCertificate;
use crate::gateway::{authorize, check_response};
use crate::resource::{self, ResourceRef};

/// Requests issuance of leaf certificates from the configured CA pool.
pub struct CertificateAuthorityGateway {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    pool: ResourceRef,
    dns_name: String,
    lifetime: std::time::Duration,
}

impl CertificateAuthorityGateway {
    #[must_use]
    pub fn new(client: Client, api: &ApiSettings, profile: &ProfileSettings) -> Self {
        Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            auth_token: api.auth_token.clone(),
            pool: profile.issuing_pool.clone(),
            dns_name: profile.dns_name.clone(),
            lifetime: profile.lifetime(),
        }
    }

    fn certificates_url(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}/caPools/{}/certificates",
            self.base_url, self.pool.project, self.pool.location, self.pool.name
        )
    }

    /// Issues a new server certificate for the profile's DNS name, binding
    /// the given public key. Returns the leaf certificate first, followed by
    /// the issuing chain.
    ///
    /// # Errors
    /// Returns `RemoteApi` when the CA rejects the request (policy
    /// violation, pool not found, ..).
    pub async fn issue_certificate(
        &self,
        cert_id: &str,
        public_key_pem: &str,
    ) -> Result<Vec<String>, RotationError> {
        let body = serde_json::json!({
            "lifetime": resource::serialize_duration(self.lifetime),
            "config": {
                "publicKey": {
                    "key": STANDARD.encode(public_key_pem.as_bytes()),
                    "format": "PEM",
                },
                "subjectConfig": {
                    "subject": {
                        "commonName": self.dns_name,
                    },
                    "subjectAltName": {
                        "dnsNames": [self.dns_name],
                    },
                },
                "x509Config": {
                    "caOptions": {
                        "isCa": false,
                    },
                    "keyUsage": {
                        "baseKeyUsage": {
                            "digitalSignature": true,
                            "keyEncipherment": true,
                        },
                        "extendedKeyUsage": {
                            "serverAuth": true,
                        },
                    },
                },
            },
        });

        info!("Requesting new certificate [{cert_id}] from pool `{}`..", self.pool.name);
        let url = self.certificates_url();
        debug!("POST {url}");
        let response = authorize(self.client.post(&url), self.auth_token.as_deref())
            .query(&[
                ("certificateId", cert_id.to_string()),
                ("requestId", Uuid::new_v4().to_string()),
            ])
            .json(&body)
            .send()
            .await?;
        let response = check_response(response, "certificate issuance").await?;
        let issued: IssuedCertificate = response.json().await?;
        info!("Issued [{}].", issued.name);

        let mut chain = Vec::with_capacity(1 + issued.pem_certificate_chain.len());
        chain.push(issued.pem_certificate);
        chain.extend(issued.pem_certificate_chain);
        Ok(chain)
    }
}
