use prfirm_core::state::ComplianceRound;

/// Characters of the last draft quoted in the report.
pub const SNIPPET_CHARS: usize = 240;

/// Fallback report written when the revision loop escalates.
pub fn build_report(history: &[ComplianceRound], last_draft: &str, platform: &str) -> String {
    let issues: usize = history.iter().map(ComplianceRound::issue_count).sum();
    let mut lines = vec![
        format!("Edit cycle reached maximum for {platform}."),
        format!("Total checks: {}; total issues flagged: {issues}.", history.len()),
    ];

    let mut per_round = history
        .iter()
        .map(|round| {
            format!(
                "  check {}: {} issue(s), {}",
                round.evaluation,
                round.issue_count(),
                round.action
            )
        })
        .peekable();
    if per_round.peek().is_some() {
        lines.push("History:".to_string());
        lines.extend(per_round);
    }

    lines.push("Last draft snippet:".to_string());
    lines.push(snippet(last_draft));
    lines.join("\n")
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
