//! Token claims.

use serde_json::{Map, Value};

/// Claims of a validated ID token.
pub type Claims = Map<String, Value>;

/// Look up a claim by field name. Dotted paths reach into nested objects,
/// e.g. `address.country`.
pub fn claim<'a>(claims: &'a Claims, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = claims.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
