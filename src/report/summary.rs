//! Plain-text compliance summary
//!
//! Fixed enumeration order (LOW, MEDIUM, HIGH then DATA, STRUCTURAL,
//! RELATIONAL, TOPOLOGICAL) so identical runs diff cleanly.

use crate::error::GovernanceResult;
use crate::pipeline::GovernanceRun;
use crate::report::{verdict, RunTally};

pub fn render_summary(run: &GovernanceRun) -> GovernanceResult<String> {
    run.ensure_complete()?;
    let tally = RunTally::from_run(run);
    let outcome = if run.fails() {
        "FAIL"
    } else if run.blocked_count() > 0 {
        "PASS (advisory warnings)"
    } else {
        "PASS"
    };

    let mut out = format!(
        "Schema change compliance summary\n\
         Branch: {}\n\
         Environment: {}\n\
         Enforcement: {}\n\
         Changes reviewed: {}\n\
         Blocked: {}\n\
         Needing manual review: {}\n\
         Outcome: {}\n\n",
        run.branch,
        run.policy_env,
        if run.enforce { "enforced" } else { "advisory" },
        run.decisions.len(),
        run.blocked_count(),
        run.review_count(),
        outcome
    );

    out.push_str("Changes by risk tier:\n");
    for (tier, count) in &tally.by_risk {
        out.push_str(&format!("  {:<12}{}\n", tier.as_str(), count));
    }

    out.push_str("\nChanges by category:\n");
    for (category, count) in &tally.by_category {
        out.push_str(&format!("  {:<12}{}\n", category.as_str(), count));
    }

    let flagged: Vec<_> = run
        .decisions
        .iter()
        .filter(|d| !d.allowed || d.review_required)
        .collect();
    if !flagged.is_empty() {
        out.push_str("\nFlagged changes:\n");
        for decision in flagged {
            out.push_str(&format!(
                "  {} {} {}\n",
                decision.migration,
                decision.risk_level,
                verdict(run, decision.allowed, decision.review_required)
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_run;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_text_is_stable() {
        let expected = "\
Schema change compliance summary
Branch: main
Environment: production
Enforcement: enforced
Changes reviewed: 2
Blocked: 1
Needing manual review: 0
Outcome: FAIL

Changes by risk tier:
  LOW         1
  MEDIUM      0
  HIGH        1

Changes by category:
  DATA        1
  STRUCTURAL  1
  RELATIONAL  1
  TOPOLOGICAL 0

Flagged changes:
  b2 HIGH BLOCKED
";
        assert_eq!(render_summary(&sample_run()).unwrap(), expected);
    }

    #[test]
    fn test_advisory_run_passes_with_warnings() {
        let mut run = sample_run();
        run.enforce = false;
        let summary = render_summary(&run).unwrap();

        assert!(summary.contains("Outcome: PASS (advisory warnings)"));
        assert!(summary.contains("b2 HIGH BLOCKED (advisory)"));
    }

    #[test]
    fn test_same_run_renders_identically() {
        let run = sample_run();
        assert_eq!(render_summary(&run).unwrap(), render_summary(&run).unwrap());
    }
}
