//! Literal placeholder substitution

/// Replace every occurrence of each placeholder, in the order given
///
/// Placeholders are plain text, not patterns. Empty placeholders are skipped.
pub fn replace_strings<K, V>(text: &str, replacements: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = text.to_string();
    for (placeholder, value) in replacements {
        let placeholder = placeholder.as_ref();
        if placeholder.is_empty() {
            continue;
        }
        out = out.replace(placeholder, value.as_ref());
    }
    out
}
