/// Parse the public URL announced by `serve --proxied`.
///
/// Must be an absolute `http://` or `https://` URL with a host.
pub fn parse_public_url(s: &str) -> Result<String, String> {
    let rest = s
        .strip_prefix("http://")
        .or_else(|| s.strip_prefix("https://"))
        .ok_or_else(|| format!("Public URL must start with http:// or https://: '{s}'"))?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(format!("Public URL has no host: '{s}'"));
    }

    Ok(s.to_string())
}

/// Parse a target name as written in `[targets.<name>]`.
pub fn parse_target_name(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        return Err("Target name cannot be empty".to_string());
    }

    if let Some(c) = s.chars().find(|c| c.is_whitespace() || *c == '.') {
        return Err(format!("Target name cannot contain {c:?}: '{s}'"));
    }

    Ok(s.to_string())
}
