//! CURL command placeholder.

use tracing::debug;

use crate::error::{Error, Result};

/// Fetch `website` using `method`. Not implemented; always fails.
pub async fn fetch(website: &str, method: &str) -> Result<()> {
    debug!("CURL {} {} requested", website, method);
    Err(Error::NotImplemented("CURL"))
}
