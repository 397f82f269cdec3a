//! Namespace → owning user resolution
//!
//! Namespaces created for a user follow the `ns<N>-us<M>` convention and
//! belong to `us<M>`. Anything else is billed to the `system` owner.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Owner assigned to namespaces that don't encode a user.
pub const SYSTEM_OWNER: &str = "system";

/// Default convention; the single capture group is the user id.
pub const DEFAULT_OWNER_PATTERN: &str = r"ns\d+-(us\d+)";

static DEFAULT_RESOLVER: Lazy<OwnerResolver> = Lazy::new(|| OwnerResolver {
    pattern: Regex::new(DEFAULT_OWNER_PATTERN).expect("default owner pattern compiles"),
});

#[derive(Error, Debug)]
pub enum OwnerPatternError {
    #[error("{0}")]
    Regex(#[from] regex::Error),
    #[error("pattern must have exactly one capture group for the user id, found {0}")]
    CaptureGroups(usize),
}

/// Maps a namespace id to the user group that pays for it.
#[derive(Debug, Clone)]
pub struct OwnerResolver {
    pattern: Regex,
}

impl OwnerResolver {
    pub fn new(pattern: &str) -> Result<Self, OwnerPatternError> {
        let pattern = Regex::new(pattern)?;
        // captures_len counts the implicit whole-match group
        let groups = pattern.captures_len() - 1;
        if groups != 1 {
            return Err(OwnerPatternError::CaptureGroups(groups));
        }
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn resolve(&self, namespace: &str) -> String {
        self.pattern
            .captures(namespace)
            .and_then(|caps| caps.get(1))
            .map(|user| user.as_str().to_string())
            .unwrap_or_else(|| SYSTEM_OWNER.to_string())
    }
}

impl Default for OwnerResolver {
    fn default() -> Self {
        DEFAULT_RESOLVER.clone()
    }
}

/// Resolve the owner of `namespace` with the default `ns<N>-us<M>` convention.
pub fn resolve_owner(namespace: &str) -> String {
    DEFAULT_RESOLVER.resolve(namespace)
}
