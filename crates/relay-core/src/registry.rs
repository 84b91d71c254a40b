//! Immutable provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::types::ProviderDefinition;

/// Registry of statically configured providers.
///
/// Immutable after construction: there is no insert/remove method.
/// Cloning is cheap (an `Arc` bump) so a `Router` can hold its own copy.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, ProviderDefinition>>,
}

impl ProviderRegistry {
    /// Build a registry from a list of provider definitions.
    ///
    /// Fails if two providers share a name.
    pub fn new(providers: Vec<ProviderDefinition>) -> RelayResult<Self> {
        let mut map = HashMap::with_capacity(providers.len());
        for provider in providers {
            if map.insert(provider.name.clone(), provider).is_some() {
                return Err(RelayError::InvalidTask(
                    "duplicate provider name in registry".to_string(),
                ));
            }
        }
        Ok(Self {
            providers: Arc::new(map),
        })
    }

    /// Look up a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderDefinition> {
        self.providers.get(name)
    }

    /// True if a provider with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Iterate over all registered providers. Iteration order is the
    /// registry's internal hash order and is not guaranteed stable across
    /// runs; callers that need a deterministic order (see the `forceModel`
    /// override path in `relay-router`) must sort explicitly.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderDefinition> {
        self.providers.values()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True if the registry has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Expand `${VAR}` references in `input` against the process environment.
///
/// Unresolvable references are left verbatim rather than erroring: this
/// mirrors shell parameter expansion with `set +u` and keeps a missing
/// credential environment variable from becoming a hard failure at
/// registry-construction time, when the embedding application (not this
/// crate) is responsible for loading provider configuration.
#[must_use]
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let Some(&(_, '{')) = chars.peek() else {
            out.push(c);
            continue;
        };
        let rest = &input[i + 1..];
        let Some(close) = rest.find('}') else {
            out.push(c);
            continue;
        };
        let var_name = &rest[1..close];
        match std::env::var(var_name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push('$');
                out.push('{');
                out.push_str(var_name);
                out.push('}');
            }
        }
        for _ in 0..=close {
            chars.next();
        }
    }

    out
}
