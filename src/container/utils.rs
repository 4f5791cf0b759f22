/// Number of id characters used when a container has no name.
const SHORT_ID_LEN: usize = 12;

/// Derives the display name of a container from the names reported by the runtime.
///
/// Docker prefixes every name with `/` (e.g. `/web-1`); the prefix is stripped.
/// Only the first name is used. Containers without any (non-empty) name fall
/// back to the short form of their id.
pub(super) fn display_name(names: &[String], id: &str) -> String {
    match names.first().map(|name| name.trim_start_matches('/')) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => short_id(id).to_owned(),
    }
}

/// Returns the first [`SHORT_ID_LEN`] characters of a container id.
pub(super) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
