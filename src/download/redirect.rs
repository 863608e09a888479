//! Redirect target resolution against the current request URL.

/// Replaces `current` with the target of a `Location` header.
///
/// A target starting with `/` is appended to the authority of `current`
/// (everything before the third `/`, or the whole string when there are fewer
/// than three). Any other target replaces `current` outright. The result is
/// truncated to fewer than `capacity` bytes; if the authority alone does not
/// fit, `current` is left unchanged.
///
/// Malformed targets are not rejected here; they produce a URL that fails on
/// the next open attempt.
pub fn resolve_redirect(current: &mut String, location: &str, capacity: usize) {
    if capacity == 0 {
        return;
    }

    if location.starts_with('/') {
        let authority_end = current
            .match_indices('/')
            .nth(2)
            .map_or(current.len(), |(index, _)| index);

        if authority_end < capacity {
            current.truncate(authority_end);
            let room = capacity - authority_end - 1;
            current.push_str(truncate_to(location, room));
        }
    } else {
        let replacement = truncate_to(location, capacity - 1);
        current.clear();
        current.push_str(replacement);
    }
}

/// Longest prefix of `value` no longer than `max` bytes that ends on a char boundary.
fn truncate_to(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
