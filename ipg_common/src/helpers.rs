/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a comma-separated list of `name:token` pairs. Entries without a name or a token are skipped.
///
/// The token may itself contain colons; only the first colon separates the name.
pub fn parse_named_tokens(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|entry| {
            let (name, token) = entry.trim().split_once(':')?;
            let (name, token) = (name.trim(), token.trim());
            (!name.is_empty() && !token.is_empty()).then(|| (name.to_string(), token.to_string()))
        })
        .collect()
}
