use serde::{Deserialize, Serialize};

/// Which side of the conversation a rule rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteDirection {
    /// Applied to the user's text before request assembly.
    Input,
    /// Applied to model output before delivery.
    Output,
}

impl std::fmt::Display for RewriteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// An ordered, directional text substitution. The pattern must compile and
/// pass the safety check before being persisted or applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub id: i64,
    /// `None` marks a global rule visible to every scope.
    pub user_id: Option<i64>,
    pub name: String,
    pub pattern: String,
    pub replacement: String,
    pub direction: RewriteDirection,
    /// Rules apply in ascending order; ties break on id.
    pub sort_order: i32,
    pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NewRewriteRule {
    pub user_id: Option<i64>,
    pub name: String,
    pub pattern: String,
    pub replacement: String,
    pub direction: RewriteDirection,
    pub sort_order: i32,
    pub is_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serde_roundtrip() {
        assert_eq!(
            serde_json::to_string(&RewriteDirection::Input).unwrap(),
            "\"input\""
        );
        let direction: RewriteDirection = serde_json::from_str("\"output\"").unwrap();
        assert_eq!(direction, RewriteDirection::Output);
    }
}
