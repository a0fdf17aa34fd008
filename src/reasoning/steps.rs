//! Parsing numbered reasoning steps out of free-form generated text.

use super::ReasoningStep;

/// Characters kept when nothing parses as a numbered step.
pub const FALLBACK_STEP_CHARS: usize = 200;

/// Parse lines like `1. Do something` into steps numbered 1..n.
///
/// A line counts when it starts with a digit and has a `.` within its first
/// three characters; the description is whatever follows the first `.`.
/// Lines with an empty description are skipped. If nothing parses, the
/// result is a single step holding the start of the output.
pub fn parse_reasoning_steps(output: &str) -> Vec<ReasoningStep> {
    let mut steps = Vec::new();

    for line in output.trim().lines().map(str::trim) {
        if !is_numbered(line) {
            continue;
        }
        let Some((_, description)) = line.split_once('.') else {
            continue;
        };
        let description = description.trim();
        if description.is_empty() {
            continue;
        }
        steps.push(ReasoningStep::new(steps.len() + 1, description));
    }

    if steps.is_empty() {
        let head: String = output.chars().take(FALLBACK_STEP_CHARS).collect();
        steps.push(ReasoningStep::new(1, head));
    }

    steps
}

fn is_numbered(line: &str) -> bool {
    let starts_with_digit = line.chars().next().map_or(false, |c| c.is_ascii_digit());
    starts_with_digit && line.chars().take(3).any(|c| c == '.')
}
