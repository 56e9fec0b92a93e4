//! Terminal rendering of triage output, as text or pretty JSON

use serde::Serialize;
use std::fmt;

use crate::aggregator::TriageResponse;

const RULE_WIDTH: usize = 80;
const ENTRY_RULE_WIDTH: usize = 60;

/// Human-readable report printed by `log-triage scan`
pub struct TextReport<'a>(pub &'a TriageResponse);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.0;

        if response.total_errors == 0 {
            return writeln!(f, "No known errors detected in the log file.");
        }

        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{}", rule)?;
        if response.is_truncated() {
            writeln!(
                f,
                "TRIAGE RESULTS: Showing {} of {} error(s) found",
                response.displayed_errors, response.total_errors
            )?;
        } else {
            writeln!(f, "TRIAGE RESULTS: {} error(s) found", response.total_errors)?;
        }
        writeln!(f, "{}", rule)?;

        for (i, record) in response.results.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "[{}] Error found at line {}:", i + 1, record.line_number)?;
            writeln!(f, "    Log Line: {}", record.log_line)?;
            writeln!(f, "    Interpretation: {}", record.interpretation)?;
            writeln!(f, "    {}", "-".repeat(ENTRY_RULE_WIDTH))?;
        }

        if response.is_truncated() {
            writeln!(f)?;
            writeln!(
                f,
                "... and {} more error(s) not shown",
                response.hidden_errors()
            )?;
        }

        Ok(())
    }
}

/// Render the text report
pub fn render_text(response: &TriageResponse) -> String {
    TextReport(response).to_string()
}

/// Render any response body as pretty JSON
pub fn render_json<T: Serialize>(body: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(body)
}
