/// Number of hex characters kept from the BLAKE3 digest for an `ETag`.
const ETAG_HEX_LEN: usize = 16;

/// Compute a weak `ETag` value for a response body.
///
/// The tag is the first 64 bits of the BLAKE3 digest, quoted and prefixed
/// with `W/` because served HTML may be modified after hashing.
#[must_use]
pub fn weak_etag(data: &[u8]) -> String {
    let hex = blake3::hash(data).to_hex();
    format!("W/\"{}\"", &hex.as_str()[..ETAG_HEX_LEN])
}

/// Check whether an `If-None-Match` header value matches `etag`.
///
/// Accepts `*` and comma-separated lists; weak comparison ignores the `W/` prefix.
#[must_use]
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let strip = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let wanted = strip(etag);
    if_none_match
        .split(',')
        .any(|candidate| candidate.trim() == "*" || strip(candidate) == wanted)
}
