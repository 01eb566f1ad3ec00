//! XML entity escaping
//!
//! Handles the five predefined XML entities (`&amp;`, `&lt;`, `&gt;`, `&quot;`,
//! `&apos;`). Absent input stays absent, so optional feed fields can be passed
//! through unchanged.

const ENTITIES: [(char, &str); 5] = [
    ('&', "&amp;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quot;"),
    ('\'', "&apos;"),
];

/// Escape `input` for use in XML text or attribute values
pub fn escape(input: Option<&str>) -> Option<String> {
    input.map(escape_str)
}

/// Reverse [`escape`]
///
/// Unknown entities and stray ampersands are kept verbatim.
pub fn unescape(input: Option<&str>) -> Option<String> {
    input.map(unescape_str)
}

/// Escape a string that is known to be present
pub fn escape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match ENTITIES.iter().find(|(ch, _)| *ch == c) {
            Some((_, entity)) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Unescape a string that is known to be present
pub fn unescape_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES
            .iter()
            .find(|(_, entity)| rest.starts_with(entity))
        {
            Some((c, entity)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
