//! Provider-qualified entity names (`name@provider`).

/// Separator between an entity name and its provider.
pub const PROVIDER_SEPARATOR: char = '@';

/// Whether `name` already carries a provider suffix.
pub fn is_qualified(name: &str) -> bool {
    name.contains(PROVIDER_SEPARATOR)
}

/// Provider part of a qualified name.
pub fn provider_of(name: &str) -> Option<&str> {
    name.split_once(PROVIDER_SEPARATOR)
        .map(|(_, provider)| provider)
        .filter(|provider| !provider.is_empty())
}

/// Qualify `name` with `provider` unless it is already qualified.
pub fn qualified_name(provider: &str, name: &str) -> String {
    if is_qualified(name) || provider.is_empty() {
        name.to_string()
    } else {
        format!("{name}{PROVIDER_SEPARATOR}{provider}")
    }
}

/// Resolve a reference made from inside `owner` against the owner's provider.
pub fn resolve_reference(owner: &str, reference: &str) -> String {
    match provider_of(owner) {
        Some(provider) => qualified_name(provider, reference),
        None => reference.to_string(),
    }
}
