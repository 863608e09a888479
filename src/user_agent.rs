//! Product User-Agent string shared by both download backends.

/// Browser-compatible prefix the console's own browser uses; some CDNs gate on it.
const PLATFORM_UA_PREFIX: &str = "Mozilla/5.0 (Nintendo 3DS; Mobile; rv:10.0) Gecko/20100101";

/// Default User-Agent for download requests (identifies the tool and version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PLATFORM_UA_PREFIX} hbfetch/{version}")
}
