//! Grab request construction.
//!
//! Turns a [`JobConfiguration`] into the URL of the source server's subtree
//! serialization endpoint:
//!
//! ```text
//! http://{host}:{port}/grabbit/job?path=..&after=..&excludePath=..&excludePath=..
//! ```

use crate::config::JobConfiguration;
use crate::error::{Error, Result};
use url::Url;

/// Source server endpoint that streams a serialized subtree
pub const GRAB_ENDPOINT: &str = "/grabbit/job";

/// Query parameter carrying the grabbed path
pub const PATH_PARAM: &str = "path";
/// Query parameter carrying the content-after-date filter
pub const AFTER_PARAM: &str = "after";
/// Repeated query parameter carrying one exclusion fragment
pub const EXCLUDE_PATH_PARAM: &str = "excludePath";

/// Build the grab URL for a job
///
/// `path` and the date filter are always present (the filter as an empty
/// value when absent); one `excludePath` parameter is appended per
/// exclusion fragment, in order.
pub fn build_grab_url(job: &JobConfiguration) -> Result<Url> {
    if job.path.is_empty() {
        return Err(Error::config("path", "path must not be empty"));
    }
    if job.host.is_empty() || job.port == 0 {
        return Err(Error::config(
            "host",
            format!("cannot address source server {}:{}", job.host, job.port),
        ));
    }

    let mut query = format!(
        "{}={}&{}={}",
        PATH_PARAM,
        urlencoding::encode(&job.path),
        AFTER_PARAM,
        urlencoding::encode(job.after_date().unwrap_or(""))
    );
    for fragment in &job.exclude_paths {
        query.push('&');
        query.push_str(EXCLUDE_PATH_PARAM);
        query.push('=');
        query.push_str(&urlencoding::encode(fragment));
    }

    let raw = format!(
        "http://{}:{}{}?{}",
        job.host, job.port, GRAB_ENDPOINT, query
    );
    let url = Url::parse(&raw).map_err(|e| {
        Error::config(
            "host",
            format!("invalid grab URL for {}:{}: {}", job.host, job.port, e),
        )
    })?;

    // A host containing '/', '?' or '@' parses but lands somewhere else.
    if url.path() != GRAB_ENDPOINT || url.port_or_known_default() != Some(job.port) {
        return Err(Error::config(
            "host",
            format!("host '{}' does not form a valid authority", job.host),
        ));
    }

    tracing::debug!(url = %url, "built grab request");
    Ok(url)
}
