use sha2::{Digest, Sha256};
use url::Url;

/// Separator for natural-key parts. A pipe does not occur at a link or
/// title boundary, so "ab|c" + "d" and "ab" + "c|d" cannot collide.
const SEPARATOR: &str = "|";

/// Derive a stable content identifier from an ordered natural-key tuple,
/// typically (link, title).
///
/// Identical tuples always yield identical identifiers. Near-duplicate
/// tuples (a trailing tracking parameter in the link, say) yield
/// different identifiers unless the caller normalizes first; see
/// [`normalize_link`].
pub fn identify<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Opt-in link normalization applied before hashing: drops the query
/// string, fragment, and any trailing slash on the path. Off by default
/// since changing the key scheme on a live namespace re-admits history.
pub fn normalize_link(link: &str) -> String {
    let Ok(mut url) = Url::parse(link) else {
        return link.trim_end_matches('/').to_string();
    };
    url.set_query(None);
    url.set_fragment(None);
    let normalized = url.to_string();
    normalized.trim_end_matches('/').to_string()
}
