use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::insights::SalonDashboard;
use crate::models::{Cohort, SalonOverview};

const REACTIVATION_LIST_LIMIT: usize = 10;

fn format_retention(cohort: &Cohort) -> String {
    cohort
        .retention
        .iter()
        .map(|value| format!("{value:.1}%"))
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn build_report(salon_label: &str, dashboard: &SalonDashboard) -> String {
    let mut output = String::new();
    let summary = &dashboard.segments.summary;

    let _ = writeln!(output, "# Customer Insights Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        salon_label,
        dashboard.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Customer Base");

    if summary.total_customers == 0 {
        let _ = writeln!(output, "No completed visits recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "- {} customers ({} new, {} returning, {:.1}% retention, {:.1}% churn)",
            summary.total_customers,
            summary.new_customers,
            summary.returning_customers,
            summary.retention_rate,
            summary.churn_rate
        );
        let _ = writeln!(
            output,
            "- Average lifetime value {:.2}, average order value {:.2}",
            summary.average_lifetime_value, summary.average_order_value
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Segment Mix");
    for (segment, count) in &dashboard.segments.breakdown {
        let _ = writeln!(output, "- {segment}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Retention");

    if dashboard.cohorts.iter().all(|c| c.size == 0) {
        let _ = writeln!(output, "No first-time customers in this window.");
    } else {
        let months = dashboard.cohorts.first().map_or(0, |c| c.retention.len());
        let header: Vec<String> = (0..months).map(|m| format!("M{m}")).collect();
        let _ = writeln!(output, "| Cohort | Size | {} |", header.join(" | "));
        let _ = writeln!(output, "|---|---|{}", "---|".repeat(months));
        for cohort in &dashboard.cohorts {
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                cohort.cohort_label,
                cohort.size,
                format_retention(cohort)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Customers");

    if dashboard.watchlist.at_risk.is_empty() {
        let _ = writeln!(output, "No customers between 60 and 180 days since their last visit.");
    } else {
        for customer in &dashboard.watchlist.at_risk {
            let _ = writeln!(
                output,
                "- {} ({}) last visit {} days ago across {} visits",
                customer.name, customer.email, customer.days_since_last_visit, customer.visit_count
            );
        }
    }

    let reactivation = &dashboard.watchlist.reactivation;
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Reactivation Opportunities ({})",
        reactivation.total_opportunities
    );

    if reactivation.customers.is_empty() {
        let _ = writeln!(output, "No lapsed customers to win back.");
    } else {
        for customer in reactivation.customers.iter().take(REACTIVATION_LIST_LIMIT) {
            let _ = writeln!(
                output,
                "- {} ({}) last visit {} ({} days ago)",
                customer.name,
                customer.email,
                customer.last_visit.format("%Y-%m-%d"),
                customer.days_since_last_visit
            );
        }
        if reactivation.customers.len() > REACTIVATION_LIST_LIMIT {
            let _ = writeln!(
                output,
                "Showing {} of {}.",
                REACTIVATION_LIST_LIMIT,
                reactivation.customers.len()
            );
        }
    }

    output
}

pub fn build_salon_report(overview: &SalonOverview) -> String {
    let mut output = String::new();
    let stats = &overview.stats;

    let _ = writeln!(output, "# Salon Compliance Overview");
    let _ = writeln!(
        output,
        "{} salons, {} verified, {} with expiring licenses, {} high risk, average compliance {}",
        stats.total, stats.verified, stats.expiring_licenses, stats.high_risk, stats.average_compliance
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk");

    if overview.high_risk.is_empty() {
        let _ = writeln!(output, "No high-risk salons.");
    } else {
        for salon in &overview.high_risk {
            let _ = writeln!(
                output,
                "- {} score {} (health {}): {}",
                salon.name,
                salon.compliance.score,
                salon.health_score,
                salon.compliance.issues.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Expiring Licenses");

    if overview.expiring.is_empty() {
        let _ = writeln!(output, "No licenses expiring within 30 days.");
    } else {
        for salon in &overview.expiring {
            let days = salon
                .license_days_remaining
                .map_or_else(|| "unknown".to_string(), |d| d.to_string());
            let _ = writeln!(output, "- {} ({} days remaining)", salon.name, days);
        }
    }

    output
}

/// Writes flat rows as CSV with a header line.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
