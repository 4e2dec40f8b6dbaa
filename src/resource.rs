use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_SUFFIX_GROUP_LEN: usize = 3;
const GLOBAL_LOCATION: &str = "global";

/// Identifies a remote resource by project, location and name.
///
/// A location of `"global"` selects the global endpoint family; anything else
/// is treated as a region name.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub project: String,
    pub location: String,
    pub name: String,
}

impl ResourceRef {
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.location == GLOBAL_LOCATION
    }
}

/// Generates a new random resource ID beginning with today's date, so that
/// rotated certificates are easy to identify in the remote console.
#[must_use]
pub fn gen_resource_id() -> String {
    let date_format = time::macros::format_description!("[year][month][day]");
    let date = time::OffsetDateTime::now_utc()
        .format(&date_format)
        .unwrap_or_default();
    format!("{date}-{}-{}", random_group(), random_group())
}

fn random_group() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_SUFFIX_GROUP_LEN)
        .map(|_| char::from(ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())]))
        .collect()
}

/// Extracts the resource ID of the given collection from a resource URI.
///
/// `parse_resource_id(".../sslCertificates/my-cert", "sslCertificates")`
/// yields `Some("my-cert")`; returns `None` when the collection segment is
/// absent.
#[must_use]
pub fn parse_resource_id<'a>(resource_uri: &'a str, collection: &str) -> Option<&'a str> {
    let marker = format!("{collection}/");
    let start = resource_uri.find(&marker)? + marker.len();
    let rest = &resource_uri[start..];
    let id = rest.split('/').next()?;
    if id.is_empty() { None } else { Some(id) }
}

/// Serializes a duration as a seconds-denominated string for a JSON request
/// body, e.g. `"2592000s"`. A whole number of seconds never carries a
/// fractional part.
#[must_use]
pub fn serialize_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    let secs = micros / 1_000_000;
    let frac = micros % 1_000_000;
    if frac == 0 {
        format!("{secs}s")
    } else {
        let frac = format!("{frac:06}");
        format!("{secs}.{}s", frac.trim_end_matches('0'))
    }
}
