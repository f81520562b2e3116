//! The natural-language instruction handed to the model, plus verdict parsing
//! for the reports it produces.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const AGENT_NAME: &str = "aisports_testing_agent";
pub const AGENT_DESCRIPTION: &str = "Autonomous integration tester for the AISports news pipeline.";

/// Versioned instruction text. Changing it changes agent behaviour.
///
/// Revision history:
/// - v2: the storage step names `list_gcs_objects/read_gcs_object/read_gcs_jsonl_preview`
///   instead of `list_gcs_objects/read_gcs_* helpers`, so every registered tool is
///   referenced by its exact name.
/// - v1: pipeline checklist with the log-polling step.
pub const TESTING_AGENT_INSTRUCTION: &str = include_str!("../prompts/testing_agent.md");

pub const REPORT_SECTIONS: [&str; 5] = ["Test Plan", "Execution", "Evidence", "Issues", "Verdict"];

static VERDICT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\**VERDICT:\s*(PASSED|FAILED)\**\s*$").expect("verdict regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    /// The last `VERDICT: PASSED|FAILED` line in `report`, if any.
    pub fn from_report(report: &str) -> Option<Self> {
        VERDICT_LINE
            .captures_iter(report)
            .last()
            .map(|captures| match &captures[1] {
                "PASSED" => Verdict::Passed,
                _ => Verdict::Failed,
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
        }
    }
}

/// Final answer of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub content: String,
    pub verdict: Option<Verdict>,
}

impl TestReport {
    pub fn from_content(content: String) -> Self {
        let verdict = Verdict::from_report(&content);
        Self { content, verdict }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Some(Verdict::Passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::pipeline::TOOL_NAMES;

    #[test]
    fn instruction_references_every_tool() {
        for tool in TOOL_NAMES {
            assert!(
                TESTING_AGENT_INSTRUCTION.contains(tool),
                "instruction does not mention {tool}"
            );
        }
    }

    #[test]
    fn instruction_names_report_sections_and_verdict_lines() {
        for section in REPORT_SECTIONS {
            assert!(
                TESTING_AGENT_INSTRUCTION.contains(&format!("`{section}`")),
                "instruction does not name section {section}"
            );
        }
        assert!(TESTING_AGENT_INSTRUCTION.contains("`VERDICT: PASSED`"));
        assert!(TESTING_AGENT_INSTRUCTION.contains("`VERDICT: FAILED`"));
    }

    #[test]
    fn instruction_names_storage_tools_exactly() {
        assert!(TESTING_AGENT_INSTRUCTION
            .contains("list_gcs_objects/read_gcs_object/read_gcs_jsonl_preview"));
        assert!(!TESTING_AGENT_INSTRUCTION.contains("read_gcs_* helpers"));
    }

    #[test]
    fn instruction_keeps_polling_guidance() {
        assert!(TESTING_AGENT_INSTRUCTION.contains("poll query_function_logs"));
    }

    #[test]
    fn verdict_uses_last_standalone_line() {
        let report = "## Verdict\nEarlier draft said VERDICT: PASSED inline.\n\nVERDICT: FAILED\n";
        assert_eq!(Verdict::from_report(report), Some(Verdict::Failed));

        let report = "## Issues\nnone\n\n**VERDICT: PASSED**";
        let parsed = TestReport::from_content(report.to_string());
        assert!(parsed.passed());
    }

    #[test]
    fn missing_verdict_is_none() {
        assert_eq!(Verdict::from_report("blocked before execution"), None);
        assert_eq!(Verdict::from_report("verdict: passed"), None);
    }
}
