//! Dotted keypath utilities.
//!
//! A keypath is a `.`-delimited string addressing a possibly nested
//! attribute (`"payment_source.card.last4"`). Pure-digit segments index
//! into sequences. The wildcard suffix `.*` marks ancestor-level change
//! notifications, and the literal `$index` resolves to a loop index
//! instead of an attribute.

/// Keypath literal that resolves to the enclosing loop index.
pub const INDEX_LITERAL: &str = "$index";

/// Split a keypath into its segments.
pub fn split(keypath: &str) -> Vec<&str> {
    keypath.split('.').collect()
}

/// Join segments back into a keypath.
pub fn join(segments: &[&str]) -> String {
    segments.join(".")
}

/// Whether `segment` addresses a sequence position (pure-digit, non-empty).
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Whether `keypath` is the loop-index literal.
pub fn is_index_literal(keypath: &str) -> bool {
    keypath == INDEX_LITERAL
}

/// Proper ancestor prefixes of `keypath`, deepest first and excluding the
/// full path itself. `"a.b.c"` yields `["a.b", "a"]`.
pub fn ancestors(keypath: &str) -> Vec<String> {
    let segments = split(keypath);
    (1..segments.len())
        .rev()
        .map(|n| segments[..n].join("."))
        .collect()
}

/// Wildcard event path for an ancestor prefix.
pub fn wildcard(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 2);
    out.push_str(prefix);
    out.push_str(".*");
    out
}

/// Prefix `keypath` for a nested binding scope. The first `this.` in the
/// combined path is dropped so loop bodies can address the loop variable.
pub fn with_prefix(prefix: Option<&str>, keypath: &str) -> String {
    let combined = match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{keypath}"),
        _ => keypath.to_string(),
    };
    match combined.find("this.") {
        Some(pos) => {
            let mut out = combined;
            out.replace_range(pos..pos + 5, "");
            out
        }
        None => combined,
    }
}
