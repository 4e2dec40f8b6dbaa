use std::sync::Arc;

use reqwest::Client;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::{ProfileSettings, Settings};
use crate::decision;
use crate::error::RotationError;
use crate::gateway::ca::CertificateAuthorityGateway;
use crate::gateway::compute::LoadBalancerGateway;
use crate::keys::KeyPairProvider;
use crate::resource;

/// Result of one profile run.
#[derive(Debug)]
pub enum RotationOutcome {
    /// The installed certificate does not need rotation (or is externally
    /// managed); nothing was mutated.
    NotDue,
    /// A new certificate was issued and bound. `old_deleted` is false when
    /// the cleanup delete of the replaced resource failed; serving is
    /// unaffected but the old resource is left behind.
    Rotated {
        new_certificate: String,
        replaced: String,
        old_deleted: bool,
    },
}

/// The end-to-end rotate-one-profile procedure.
pub struct RotationWorkflow {
    compute: LoadBalancerGateway,
    ca: CertificateAuthorityGateway,
    keys: Arc<dyn KeyPairProvider>,
    threshold: f64,
}

impl RotationWorkflow {
    #[must_use]
    pub fn new(
        http: &Client,
        settings: &Settings,
        profile: &ProfileSettings,
        keys: Arc<dyn KeyPairProvider>,
    ) -> Self {
        let compute = LoadBalancerGateway::new(
            http.clone(),
            &settings.compute,
            settings.operations.clone(),
            profile.load_balancer.clone(),
        );
        let ca = CertificateAuthorityGateway::new(http.clone(), &settings.ca, profile);
        Self {
            compute,
            ca,
            keys,
            threshold: profile.rotation_threshold,
        }
    }

    /// Runs the rotation sequence: fetch the installed certificate, decide,
    /// and if due issue a replacement, install it and remove the old one.
    ///
    /// The new certificate is always bound before the old resource is
    /// deleted, so the load balancer is never left without a valid
    /// certificate. A failed cleanup delete is reported in the outcome, not
    /// as an error.
    ///
    /// # Errors
    /// Any failure up to and including the binding step aborts the run with
    /// the underlying error; the load balancer then still serves the old
    /// certificate.
    pub async fn run(&self) -> Result<RotationOutcome, RotationError> {
        let current = self.compute.first_certificate().await?;
        info!("Processing certificate `{}`.", current.name);

        if !decision::should_rotate(&current, self.threshold, OffsetDateTime::now_utc()) {
            info!("Certificate does not need rotation.");
            return Ok(RotationOutcome::NotDue);
        }
        info!("Certificate needs rotation.");

        let cert_id = resource::gen_resource_id();
        let key_pair = self.keys.generate()?;

        let chain = self
            .ca
            .issue_certificate(&cert_id, &key_pair.public_key_pem)
            .await?;
        let new_certificate = self
            .compute
            .create_ssl_certificate(
                &format!("auto-{cert_id}"),
                &key_pair.private_key_pem,
                &chain.concat(),
            )
            .await?;
        self.compute.set_ssl_certificate(&new_certificate).await?;

        let old_deleted = match self.compute.delete_ssl_certificate(&current.name).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Rotation succeeded but the old certificate `{}` could not be deleted: {err}",
                    current.name
                );
                false
            }
        };

        Ok(RotationOutcome::Rotated {
            new_certificate,
            replaced: current.name,
            old_deleted,
        })
    }
}
