use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::RotationError;
use crate::keys::{KeyPairProvider, RsaKeyPairProvider};
use crate::workflow::{RotationOutcome, RotationWorkflow};

/// Shared handles for all profile workflows: configuration, the HTTP client
/// reused by every gateway, the key-pair source and one in-flight lock per
/// profile. Built once at startup.
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub http: reqwest::Client,
    pub keys: Arc<dyn KeyPairProvider>,
    locks: Vec<Arc<Mutex<()>>>,
}

impl AppContext {
    /// Builds the context with the default RSA key-pair provider.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(settings: Settings) -> Result<Self, RotationError> {
        Self::with_key_provider(settings, Arc::new(RsaKeyPairProvider::default()))
    }

    /// Builds the context with a custom key-pair provider.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn with_key_provider(
        settings: Settings,
        keys: Arc<dyn KeyPairProvider>,
    ) -> Result<Self, RotationError> {
        let http = reqwest::Client::builder().build()?;
        let locks = settings
            .profiles
            .iter()
            .map(|_| Arc::new(Mutex::new(())))
            .collect();
        Ok(Self {
            settings: Arc::new(settings),
            http,
            keys,
            locks,
        })
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Rotated,
    NotDue,
    Failed,
    /// A rotation for this profile was already in flight when the trigger
    /// arrived; the trigger was rejected instead of racing it.
    Rejected,
}

#[derive(Debug, Serialize)]
pub struct ProfileReport {
    pub profile: String,
    pub status: ProfileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProfileReport {
    fn from_outcome(profile: String, outcome: &RotationOutcome) -> Self {
        match outcome {
            RotationOutcome::NotDue => Self {
                profile,
                status: ProfileStatus::NotDue,
                detail: None,
            },
            RotationOutcome::Rotated {
                new_certificate,
                replaced,
                old_deleted,
            } => Self {
                profile,
                status: ProfileStatus::Rotated,
                detail: Some(if *old_deleted {
                    format!("replaced `{replaced}` with {new_certificate}")
                } else {
                    format!(
                        "replaced `{replaced}` with {new_certificate}; old resource could not be deleted"
                    )
                }),
            },
        }
    }

    fn from_error(profile: String, err: &RotationError) -> Self {
        let status = if matches!(err, RotationError::InFlight) {
            ProfileStatus::Rejected
        } else {
            ProfileStatus::Failed
        };
        Self {
            profile,
            status,
            detail: Some(format!("{}: {err}", err.kind())),
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self.status, ProfileStatus::Failed | ProfileStatus::Rejected)
    }
}

/// Overall classification of one trigger invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialFailure,
    Failure,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub profiles: Vec<ProfileReport>,
}

impl RunReport {
    #[must_use]
    pub fn status(&self) -> RunStatus {
        let failures = self.profiles.iter().filter(|p| p.is_failure()).count();
        if failures == 0 {
            RunStatus::Success
        } else if failures == self.profiles.len() {
            RunStatus::Failure
        } else {
            RunStatus::PartialFailure
        }
    }
}

/// Runs the rotation workflow for every configured profile, bounded by the
/// scheduler's concurrency limit. One profile's failure never prevents the
/// others from running.
pub async fn run_all_profiles(ctx: &Arc<AppContext>) -> RunReport {
    let max_concurrent = usize::try_from(ctx.settings.scheduler.max_concurrent_rotations)
        .unwrap_or(usize::MAX)
        .max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    let mut handles = Vec::new();
    for (index, profile) in ctx.settings.profiles.iter().enumerate() {
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        handles.push((
            profile.label(),
            tokio::spawn(async move { run_profile(&ctx, index, semaphore).await }),
        ));
    }

    let mut profiles = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        match handle.await {
            Ok(report) => profiles.push(report),
            Err(err) => {
                error!("Profile task for '{label}' panicked: {err}");
                profiles.push(ProfileReport {
                    profile: label,
                    status: ProfileStatus::Failed,
                    detail: Some(format!("task join error: {err}")),
                });
            }
        }
    }

    let report = RunReport { profiles };
    info!("Rotation run finished: {:?}", report.status());
    report
}

async fn run_profile(ctx: &Arc<AppContext>, index: usize, semaphore: Arc<Semaphore>) -> ProfileReport {
    let profile = &ctx.settings.profiles[index];
    let label = profile.label();

    // Reject a trigger that overlaps a still-running rotation of the same
    // profile instead of racing it on the load-balancer binding.
    let Ok(_guard) = ctx.locks[index].try_lock() else {
        warn!("Rotation for profile '{label}' is already in flight; rejecting trigger.");
        return ProfileReport::from_error(label, &RotationError::InFlight);
    };

    let Ok(_permit) = semaphore.acquire().await else {
        return ProfileReport::from_error(
            label,
            &RotationError::Config("scheduler semaphore closed".to_string()),
        );
    };

    info!("Starting rotation workflow for profile '{label}'.");
    let workflow = RotationWorkflow::new(&ctx.http, &ctx.settings, profile, Arc::clone(&ctx.keys));
    match workflow.run().await {
        Ok(outcome) => ProfileReport::from_outcome(label, &outcome),
        Err(err) => {
            error!("Rotation for profile '{label}' aborted: {err}");
            ProfileReport::from_error(label, &err)
        }
    }
}
