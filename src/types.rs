use std::fmt;

/// Identity of a node in the workflow graph: either the terminal sentinel
/// or a named step/router. Reaching `End` stops the executor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    End,
    Named(String),
}

impl StepKind {
    pub fn named(name: impl Into<String>) -> Self {
        StepKind::Named(name.into())
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StepKind::End)
    }

    /// Stable string form used in error scopes, checkpoints, and logs.
    pub fn encode(&self) -> String {
        match self {
            StepKind::End => "End".to_string(),
            StepKind::Named(name) => format!("Step:{name}"),
        }
    }
}

impl From<&str> for StepKind {
    fn from(name: &str) -> Self {
        StepKind::Named(name.to_string())
    }
}

impl From<String> for StepKind {
    fn from(name: String) -> Self {
        StepKind::Named(name)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_forms() {
        assert_eq!(StepKind::End.encode(), "End");
        assert_eq!(StepKind::named("classify").encode(), "Step:classify");
    }

    #[test]
    fn test_from_str() {
        let kind: StepKind = "retrieve".into();
        assert_eq!(kind, StepKind::Named("retrieve".to_string()));
        assert!(!kind.is_end());
        assert!(StepKind::End.is_end());
    }
}
