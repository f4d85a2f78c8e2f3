use tracing::debug;

/// Uppercased first letter of every word, e.g. "Acme Build Co" -> "ABC".
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Prefix used for a scope entity: the override when set, otherwise its initials.
pub fn invoice_prefix(scope_name: &str, prefix_override: Option<&str>) -> String {
    match prefix_override.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => initials(scope_name),
    }
}

/// Next sequential number for the prefix: existing numbers sharing the exact
/// prefix, plus one, padded to three digits.
///
/// Nothing is reserved. Two drafts assembled from the same history get the
/// same number.
pub fn next_invoice_number<'a, I>(scope_name: &str, prefix_override: Option<&str>, history: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = invoice_prefix(scope_name, prefix_override);
    let taken = history.into_iter().filter(|n| n.starts_with(&prefix)).count();
    let number = format!("{}{:03}", prefix, taken + 1);
    debug!(%prefix, taken, %number, "assigned invoice number");
    number
}
