//! Service name sanitisation for the `_audiowallet._tcp` mDNS record
//! (§4.A). Pure and independently testable because it is load-bearing for
//! the "exactly one TXT record, always valid" invariant (§3 invariant 5):
//! whatever a room is named, the announcer must be able to publish it.

const MAX_LEN: usize = 63;
const FALLBACK: &str = "PandemicRoom";

/// Coerce an arbitrary room name into the ASCII `[A-Za-z0-9-]{1,63}`
/// instance name the mDNS record requires: disallowed runs collapse to a
/// single `-`, the result is truncated to 63 bytes, and an empty result
/// falls back to [`FALLBACK`].
pub fn sanitize_service_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            last_was_dash = ch == '-';
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
        // leading disallowed runs are simply dropped, not turned into a
        // leading dash
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(MAX_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        FALLBACK.to_owned()
    } else {
        out
    }
}
