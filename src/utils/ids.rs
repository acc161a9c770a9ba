//! Run identifier generation.
//!
//! Run identifiers are opaque tokens, unique per invocation. The `run-`
//! prefix keeps them recognizable in checkpoint listings and logs.

use uuid::Uuid;

/// Generate a fresh run identifier (`run-<uuid>`).
pub fn run_id() -> String {
    prefixed("run")
}

/// Generate an identifier with an arbitrary prefix.
pub fn prefixed(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Check that an identifier carries the expected prefix.
pub fn has_prefix(id: &str, expected: &str) -> bool {
    id.split('-').next() == Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_prefix_and_uniqueness() {
        let a = run_id();
        let b = run_id();
        assert!(a.starts_with("run-"));
        assert!(has_prefix(&a, "run"));
        assert!(!has_prefix(&a, "step"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefixed() {
        assert!(prefixed("fuzz").starts_with("fuzz-"));
    }
}
