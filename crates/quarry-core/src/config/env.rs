//! `${VAR}` expansion for configuration files.
//!
//! Expansion runs on the raw YAML text before parsing, so secrets can stay
//! out of the file. `${VAR:-fallback}` supplies a value for unset variables.
//! Only the braced form is recognised: bare `$1` or `$$` belong to SQL.

use super::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` using the process environment.
pub fn expand_env(input: &str) -> Result<String, ConfigError> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand variables using an arbitrary lookup.
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedEnv)?;
        let expr = &after[..end];

        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (expr.trim(), None),
        };

        match (lookup(name), fallback) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(fallback)) => out.push_str(fallback),
            (None, None) => {
                return Err(ConfigError::MissingEnv {
                    name: name.to_string(),
                });
            }
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
