//! Link resolution: turn a free-text CSV cell into image locators.
//!
//! Form exports put every uploaded file of a question into one cell. Depending
//! on the export path the links are separated by commas, semicolons or line
//! breaks, sometimes quoted, sometimes padded with `null` for an empty upload.
//! [`resolve`] splits on all of those, keeps what looks like a provider link or
//! a bare file id, and extracts the provider identifier.
//!
//! Resolution never fails: a candidate that cannot be understood is logged at
//! debug level and dropped, and the report simply has one photo fewer.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Host substrings recognised when no config is at hand.
pub const DEFAULT_PROVIDER_HOSTS: &[&str] = &["drive.google.com", "docs.google.com"];

/// Shortest string accepted as a bare provider identifier.
const MIN_BARE_ID_LEN: usize = 25;

static RE_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

static RE_BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap());

/// Identifier rules, tried in order; the first capture wins.
static ID_RULES: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        // /file/d/<id>/view
        Regex::new(r"/file/d/([A-Za-z0-9_\-]+)").unwrap(),
        // ?id=<id> / &id=<id>
        Regex::new(r"id=([A-Za-z0-9_\-]+)").unwrap(),
        // long id as a path segment
        Regex::new(r"/([A-Za-z0-9_\-]{33,})").unwrap(),
        // the whole string is the id
        Regex::new(r"^([A-Za-z0-9_\-]+)$").unwrap(),
    ]
});

/// Path and query markers that identify a provider link on their own.
const PROVIDER_MARKERS: &[&str] = &["/file/d/", "id="];

/// A normalised reference to one remote image.
///
/// Two locators with the same `id` name the same resource; the fetcher keys
/// its cache on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    /// Provider-specific opaque identifier.
    pub id: String,
    /// The trimmed candidate text the id was extracted from.
    pub source: String,
}

impl Locator {
    /// Direct-download address of this resource under `endpoint`.
    pub fn download_url(&self, endpoint: &str) -> String {
        format!("{}?export=download&id={}", endpoint, self.id)
    }

    /// Download address with the interstitial confirmation token appended.
    pub fn confirmed_download_url(&self, endpoint: &str, token: &str) -> String {
        format!("{}&confirm={}", self.download_url(endpoint), token)
    }
}

/// Resolve a raw cell with the default provider hosts.
pub fn resolve(raw_text: &str) -> Vec<Locator> {
    resolve_with_hosts(raw_text, DEFAULT_PROVIDER_HOSTS)
}

/// Resolve a raw cell into locators, preserving input order.
///
/// No deduplication happens here; repeated ids are collapsed by the fetcher's
/// cache instead.
pub fn resolve_with_hosts<S: AsRef<str>>(raw_text: &str, provider_hosts: &[S]) -> Vec<Locator> {
    let mut locators = Vec::new();

    for candidate in split_candidates(raw_text) {
        if !is_acceptable(candidate, provider_hosts) {
            debug!(candidate, "Dropping candidate that is not an image link");
            continue;
        }
        match extract_id(candidate) {
            Some(id) => {
                debug!(id = %id, candidate, "Resolved image locator");
                locators.push(Locator {
                    id,
                    source: candidate.to_string(),
                });
            }
            None => warn!(candidate, "Could not extract a file id from link"),
        }
    }

    locators
}

/// Split a cell on `; , \n \r`, trim quotes and whitespace, and drop empties
/// and `null` / `none` placeholders.
pub fn split_candidates(raw_text: &str) -> impl Iterator<Item = &str> {
    raw_text
        .split([';', ',', '\n', '\r'])
        .map(|c| c.trim_matches(|ch: char| ch.is_whitespace() || ch == '"' || ch == '\''))
        .filter(|c| !c.is_empty())
        .filter(|c| !c.eq_ignore_ascii_case("null") && !c.eq_ignore_ascii_case("none"))
}

fn is_acceptable<S: AsRef<str>>(candidate: &str, provider_hosts: &[S]) -> bool {
    provider_hosts
        .iter()
        .any(|host| candidate.contains(host.as_ref()))
        || PROVIDER_MARKERS.iter().any(|m| candidate.contains(m))
        || RE_SCHEME.is_match(candidate)
        || (candidate.len() >= MIN_BARE_ID_LEN && RE_BARE_ID.is_match(candidate))
}

/// Apply the identifier rules in order and return the first capture.
pub fn extract_id(candidate: &str) -> Option<String> {
    ID_RULES
        .iter()
        .find_map(|re| re.captures(candidate))
        .map(|caps| caps[1].to_string())
}
