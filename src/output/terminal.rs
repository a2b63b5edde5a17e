// Colored terminal output for verdicts, enforcement results, and policies.
//
// main.rs and status.rs delegate all terminal formatting here.

use colored::Colorize;

use crate::db::models::EnforcementRecord;
use crate::enforce::{ActionOutcome, EnforcementResult};
use crate::engine::Outcome;
use crate::policy::Policy;
use crate::verdict::{Verdict, ViolationClass};

/// One line describing a verdict.
pub fn display_verdict(label: &str, verdict: &Verdict) {
    match verdict.violation() {
        None => println!("  {} {}", "ok".green(), label.dimmed()),
        Some(v) => println!(
            "  {} {} [{}] {}",
            "!!".red().bold(),
            label,
            colorize_class(v.reason.class(), v.reason.code()),
            v.human_reason
        ),
    }
}

/// A verdict followed by every action taken for it.
pub fn display_outcome(label: &str, outcome: &Outcome) {
    display_verdict(label, &outcome.verdict);
    if let Some(result) = &outcome.enforcement {
        display_enforcement(result);
    }
}

pub fn display_enforcement(result: &EnforcementResult) {
    for record in &result.actions {
        let outcome = match &record.outcome {
            ActionOutcome::Applied => "applied".green().to_string(),
            ActionOutcome::Failed(e) => format!("{} ({})", "failed".red(), e),
            ActionOutcome::TimedOut => "timed out".yellow().to_string(),
            ActionOutcome::Skipped(why) => format!("{} ({})", "skipped".dimmed(), why),
        };
        println!("      {:<14} {}", record.action.as_str(), outcome);
    }
    if result.tracking_reset {
        println!("      {}", "tracking reset".dimmed());
    }
}

/// Display a full policy as pretty JSON with a heading.
pub fn display_policy(policy: &Policy) {
    println!(
        "\n{}",
        format!("=== Policy for {} ({}) ===", policy.tenant_id, policy.tenant_name).bold()
    );
    match policy.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => println!("  {} {}", "could not render policy:".red(), e),
    }
}

/// Display recent enforcement audit rows.
pub fn display_enforcements(records: &[EnforcementRecord]) {
    if records.is_empty() {
        println!("Recent enforcements: none yet");
        return;
    }

    println!(
        "\n{}",
        format!("=== Recent Enforcements ({}) ===", records.len()).bold()
    );
    println!(
        "  {:<25}  {:<16} {:<16} {:<20}  {}",
        "When".dimmed(),
        "Tenant".dimmed(),
        "Actor".dimmed(),
        "Reason".dimmed(),
        "Result".dimmed(),
    );
    println!("  {}", "-".repeat(90).dimmed());

    for record in records {
        let applied = if record.fully_applied {
            "applied".green()
        } else {
            "partial".yellow()
        };
        println!(
            "  {:<25}  {:<16} {:<16} {:<20}  {}",
            super::truncate_chars(&record.enforced_at, 25),
            super::truncate_chars(&record.tenant_id, 16),
            super::truncate_chars(&record.actor_id, 16),
            record.reason_code,
            applied,
        );
    }
}

/// Colorize a reason code by the detector family that produced it.
fn colorize_class(class: ViolationClass, code: &str) -> colored::ColoredString {
    match class {
        ViolationClass::PrivilegedAction => code.red().bold(),
        ViolationClass::Rate => code.bright_red(),
        ViolationClass::Content => code.yellow(),
    }
}
