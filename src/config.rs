use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::RotationError;
use crate::resource::ResourceRef;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub listen_port: u16,
    pub compute: ApiSettings,
    pub ca: ApiSettings,
    pub operations: OperationSettings,
    pub scheduler: SchedulerSettings,
    pub profiles: Vec<ProfileSettings>,
}

/// Endpoint of one remote control-plane API.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub auth_token: Option<String>,
}

/// Bounds for long-running-operation polling.
#[derive(Debug, Deserialize, Clone)]
pub struct OperationSettings {
    pub poll_attempts: u64,
    pub poll_base_delay_secs: u64,
    pub poll_max_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSettings {
    pub max_concurrent_rotations: u64,
}

/// One rotation policy: a load balancer, the CA pool that issues its
/// replacement certificates, and when rotation becomes due.
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileSettings {
    pub load_balancer: ResourceRef,
    pub issuing_pool: ResourceRef,
    pub dns_name: String,
    pub lifetime_days: u32,
    pub rotation_threshold: f64,
}

impl ProfileSettings {
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.lifetime_days) * 86_400)
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.load_balancer.is_global()
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.load_balancer.project, self.load_balancer.location, self.load_balancer.name
        )
    }
}

const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
const DEFAULT_CA_BASE_URL: &str = "https://privateca.googleapis.com/v1";
const DEFAULT_POLL_ATTEMPTS: u64 = 20;
const DEFAULT_POLL_BASE_DELAY_SECS: u64 = 1;
const DEFAULT_POLL_MAX_DELAY_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT_ROTATIONS: u64 = 4;

impl Settings {
    /// Creates a new `Settings` instance from defaults, an optional YAML
    /// file and `ROTATOR_*` environment variables.
    ///
    /// # Errors
    /// Returns error if configuration parsing fails (e.g. invalid format,
    /// missing required profile fields).
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut s = Config::builder();

        s = s
            .set_default("listen_port", DEFAULT_LISTEN_PORT)?
            .set_default("compute.base_url", DEFAULT_COMPUTE_BASE_URL)?
            .set_default("ca.base_url", DEFAULT_CA_BASE_URL)?
            .set_default("operations.poll_attempts", DEFAULT_POLL_ATTEMPTS)?
            .set_default(
                "operations.poll_base_delay_secs",
                DEFAULT_POLL_BASE_DELAY_SECS,
            )?
            .set_default("operations.poll_max_delay_secs", DEFAULT_POLL_MAX_DELAY_SECS)?
            .set_default(
                "scheduler.max_concurrent_rotations",
                DEFAULT_MAX_CONCURRENT_ROTATIONS,
            )?
            .set_default("profiles", Vec::<String>::new())?;

        let path = config_path.unwrap_or_else(|| PathBuf::from("rotator.yaml"));
        s = s.add_source(File::from(path).required(false));

        // e.g. ROTATOR_LISTEN_PORT, ROTATOR_COMPUTE__AUTH_TOKEN
        s = s.add_source(
            Environment::with_prefix("ROTATOR")
                .separator("__")
                .try_parsing(true)
                .ignore_empty(true),
        );

        s.build()?.try_deserialize()
    }

    /// Validates configuration values for correctness. All problems are
    /// reported in one pass rather than one per run.
    ///
    /// # Errors
    /// Returns `RotationError::Config` listing every invalid field.
    pub fn validate(&self) -> Result<(), RotationError> {
        let mut faults = Vec::new();

        if self.profiles.is_empty() {
            faults.push("profiles must not be empty".to_string());
        }
        if self.operations.poll_attempts == 0 {
            faults.push("operations.poll_attempts must be greater than 0".to_string());
        }
        if self.operations.poll_base_delay_secs > self.operations.poll_max_delay_secs {
            faults.push(
                "operations.poll_base_delay_secs must be <= operations.poll_max_delay_secs"
                    .to_string(),
            );
        }
        if self.scheduler.max_concurrent_rotations == 0 {
            faults.push("scheduler.max_concurrent_rotations must be greater than 0".to_string());
        }
        if self.compute.base_url.trim().is_empty() {
            faults.push("compute.base_url must not be empty".to_string());
        }
        if self.ca.base_url.trim().is_empty() {
            faults.push("ca.base_url must not be empty".to_string());
        }

        for (index, profile) in self.profiles.iter().enumerate() {
            validate_resource_ref(
                &mut faults,
                &profile.load_balancer,
                &format!("profiles[{index}].load_balancer"),
            );
            validate_resource_ref(
                &mut faults,
                &profile.issuing_pool,
                &format!("profiles[{index}].issuing_pool"),
            );
            if profile.dns_name.trim().is_empty() {
                faults.push(format!("profiles[{index}].dns_name must not be empty"));
            }
            if profile.lifetime_days == 0 {
                faults.push(format!(
                    "profiles[{index}].lifetime_days must be greater than 0"
                ));
            }
            if !(profile.rotation_threshold > 0.0 && profile.rotation_threshold <= 1.0) {
                faults.push(format!(
                    "profiles[{index}].rotation_threshold must be in (0, 1]"
                ));
            }
        }

        if faults.is_empty() {
            Ok(())
        } else {
            Err(RotationError::Config(faults.join("; ")))
        }
    }
}

fn validate_resource_ref(faults: &mut Vec<String>, resource: &ResourceRef, field: &str) {
    if resource.project.trim().is_empty() {
        faults.push(format!("{field}.project must not be empty"));
    }
    if resource.location.trim().is_empty() {
        faults.push(format!("{field}.location must not be empty"));
    }
    if resource.name.trim().is_empty() {
        faults.push(format!("{field}.name must not be empty"));
    }
}
