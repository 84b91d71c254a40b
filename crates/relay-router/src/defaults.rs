//! The default routing table consulted once overrides, learned patterns
//! and rules have all declined to match.

/// Provider name buckets for the default routing table.
///
/// A `None` (or empty-string) bucket falls back to
/// [`DefaultRoutes::WIRED_IN_PROVIDER`]; if that name is also absent from
/// the registry, `Router::route` returns `ProviderNotFound`.
#[derive(Debug, Clone, Default)]
pub struct DefaultRoutes {
    /// Provider for simple tasks touching at most one context file.
    pub simple_tasks: Option<String>,
    /// Provider for tasks whose estimated context exceeds 50,000 tokens.
    pub large_context: Option<String>,
    /// Provider for tasks classified complex.
    pub complex_tasks: Option<String>,
    /// Provider for everything else. The original default table also
    /// special-cased `file_count > 3` ahead of this bucket, but that rule
    /// resolved to the same provider as the catch-all, so the two are
    /// collapsed here (see DESIGN.md).
    pub implementation: Option<String>,
}

impl DefaultRoutes {
    /// Name used when a bucket is unset and has no configured fallback.
    pub const WIRED_IN_PROVIDER: &'static str = "default";

    /// Resolve a bucket to a provider name, falling back to the wired-in
    /// default when the bucket is empty or missing.
    #[must_use]
    pub fn resolve(bucket: &Option<String>) -> &str {
        match bucket {
            Some(name) if !name.is_empty() => name,
            _ => Self::WIRED_IN_PROVIDER,
        }
    }
}
