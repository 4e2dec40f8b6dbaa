use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::RotationError;

/// The load-balancer frontend resource holding the active certificate binding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHttpsProxy {
    pub name: String,
    #[serde(default)]
    pub ssl_certificates: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateType {
    Managed,
    SelfManaged,
    #[serde(other)]
    Unspecified,
}

/// Wire form of a certificate resource as returned by the control plane.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslCertificate {
    pub name: String,
    pub self_link: String,
    #[serde(rename = "type", default = "default_certificate_type")]
    pub certificate_type: CertificateType,
    pub creation_timestamp: String,
    pub expire_time: String,
}

fn default_certificate_type() -> CertificateType {
    CertificateType::SelfManaged
}

/// The currently installed certificate, with timestamps parsed.
///
/// Fetched fresh on every workflow run; never cached.
#[derive(Debug, Clone)]
pub struct InstalledCertificate {
    pub name: String,
    pub self_link: String,
    pub certificate_type: CertificateType,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl TryFrom<SslCertificate> for InstalledCertificate {
    type Error = RotationError;

    fn try_from(cert: SslCertificate) -> Result<Self, Self::Error> {
        let not_before = parse_timestamp(&cert.creation_timestamp, "creationTimestamp")?;
        let not_after = parse_timestamp(&cert.expire_time, "expireTime")?;
        Ok(Self {
            name: cert.name,
            self_link: cert.self_link,
            certificate_type: cert.certificate_type,
            not_before,
            not_after,
        })
    }
}

fn parse_timestamp(value: &str, field: &str) -> Result<OffsetDateTime, RotationError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| RotationError::InvalidCertificate(format!("{field} `{value}`: {e}")))
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
}

/// A long-running mutation tracked by a separate status resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    pub self_link: String,
    #[serde(default)]
    pub target_link: Option<String>,
    pub status: OperationStatus,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub http_error_status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct OperationErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// Joins all error messages of a failed operation into one line.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        if error.errors.is_empty() {
            return Some("operation reported an error with no detail".to_string());
        }
        let joined = error
            .errors
            .iter()
            .map(|e| {
                if e.code.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.code, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        Some(joined)
    }
}

/// Response of the certificate-authority issuance call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    pub name: String,
    pub pem_certificate: String,
    #[serde(default)]
    pub pem_certificate_chain: Vec<String>,
}
