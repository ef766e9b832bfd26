//! Markdown governance dashboard

use crate::error::GovernanceResult;
use crate::pipeline::GovernanceRun;
use crate::report::{verdict, RunTally};

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub fn render_dashboard(run: &GovernanceRun) -> GovernanceResult<String> {
    run.ensure_complete()?;
    let tally = RunTally::from_run(run);
    let mut out = format!(
        "# Schema Governance Dashboard\n\n\
         - Branch: `{}`\n\
         - Policy environment: `{}`\n\
         - Enforcement: {}\n\
         - Decisions: {} ({} blocked, {} for review)\n\n",
        run.branch,
        run.policy_env,
        if run.enforce { "enforced" } else { "advisory" },
        run.decisions.len(),
        run.blocked_count(),
        run.review_count()
    );

    out.push_str("## Risk tiers\n\n| Tier | Count |\n|------|-------|\n");
    for (tier, count) in &tally.by_risk {
        out.push_str(&format!("| {} | {} |\n", tier, count));
    }

    out.push_str("\n## Categories\n\n| Category | Count |\n|----------|-------|\n");
    for (category, count) in &tally.by_category {
        out.push_str(&format!("| {} | {} |\n", category, count));
    }

    out.push_str("\n## Revisions\n\n");
    out.push_str("| Revision | Risk | Categories | Legacy | Override | Verdict |\n");
    out.push_str("|----------|------|------------|--------|----------|---------|\n");
    for decision in &run.decisions {
        let categories: Vec<&str> = decision.categories.iter().map(|c| c.as_str()).collect();
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            decision.migration,
            decision.risk_level,
            categories.join(", "),
            flag(decision.legacy),
            flag(decision.breaking_ok),
            verdict(run, decision.allowed, decision.review_required)
        ));
    }

    Ok(out)
}
