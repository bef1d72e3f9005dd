use std::fmt;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    LowFps,
    HighMemory,
    HighDrawCalls,
    HighTriangles,
}

impl WarningCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowFps => "low_fps",
            Self::HighMemory => "high_memory",
            Self::HighDrawCalls => "high_draw_calls",
            Self::HighTriangles => "high_triangles",
        }
    }
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// A threshold crossing reported by the frame monitor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceWarning {
    pub category: WarningCategory,
    pub severity: Severity,
    pub message: String,
    pub timestamp_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert_eq!(WarningCategory::LowFps.to_string(), "low_fps");
        assert_eq!(
            serde_json::to_string(&WarningCategory::HighDrawCalls).unwrap(),
            "\"high_draw_calls\""
        );
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }
}
