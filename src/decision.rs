use time::OffsetDateTime;
use tracing::{info, warn};

use crate::gateway::types::{CertificateType, InstalledCertificate};

/// Determines whether the installed certificate must be rotated.
///
/// Externally managed certificates are never rotated. An expired certificate
/// is always due. Otherwise the certificate is due once the remaining
/// fraction of its lifetime drops to `threshold` or below. A certificate
/// whose timestamps yield a non-positive lifetime is treated as due.
///
/// Pure with respect to state; the only side effect is logging.
#[must_use]
pub fn should_rotate(cert: &InstalledCertificate, threshold: f64, now: OffsetDateTime) -> bool {
    if cert.certificate_type == CertificateType::Managed {
        warn!("Ignoring externally managed certificate [{}].", cert.self_link);
        return false;
    }

    if now > cert.not_after {
        warn!("Current certificate [{}] is expired.", cert.name);
        return true;
    }

    let lifetime = cert.not_after - cert.not_before;
    if lifetime <= time::Duration::ZERO {
        warn!(
            "Certificate [{}] reports notAfter <= notBefore; treating it as due for rotation.",
            cert.name
        );
        return true;
    }

    let remaining = cert.not_after - now;
    let remaining_ratio = remaining.as_seconds_f64() / lifetime.as_seconds_f64();
    info!(
        "Current certificate is still valid for {remaining} ({:.2}% of lifetime).",
        remaining_ratio * 100.0
    );
    remaining_ratio <= threshold
}
