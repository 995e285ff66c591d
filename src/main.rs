use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use salon_analytics::churn::DEFAULT_AT_RISK_LIMIT;
use salon_analytics::cohorts::{DEFAULT_COHORT_MONTHS, MAX_COHORT_MONTHS};
use salon_analytics::models::{ComplianceInput, HealthInput, LicenseStatus};
use salon_analytics::{db, insights, report, scoring};

#[derive(Parser)]
#[command(name = "salon-analytics")]
#[command(about = "Customer segmentation, retention and churn insights for salons", long_about = None)]
struct Cli {
    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo salon with customers in every segment
    Seed,
    /// Import appointment history from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify every customer of a salon
    Segments {
        #[arg(long)]
        salon: Uuid,
        /// Also write the classified customers to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Monthly first-visit cohorts with retention
    Cohorts {
        #[arg(long)]
        salon: Uuid,
        #[arg(
            long,
            default_value_t = DEFAULT_COHORT_MONTHS,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_COHORT_MONTHS as u64)
        )]
        months: usize,
    },
    /// Customers 60 to 180 days past their last visit
    AtRisk {
        #[arg(long)]
        salon: Uuid,
        #[arg(long, default_value_t = DEFAULT_AT_RISK_LIMIT)]
        limit: usize,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Lapsed customers worth a win-back campaign
    Reactivation {
        #[arg(long)]
        salon: Uuid,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Churn risk of a single customer
    ChurnRisk {
        #[arg(long)]
        salon: Uuid,
        #[arg(long)]
        customer: Uuid,
    },
    /// Lifetime value and three-year projection of a single customer
    Clv {
        #[arg(long)]
        salon: Uuid,
        #[arg(long)]
        customer: Uuid,
    },
    /// Compliance and health across all salons
    Salons,
    /// Score a salon from explicit inputs without a database
    Compliance(ComplianceArgs),
    /// Generate a markdown dashboard report
    Report {
        #[arg(long)]
        salon: Uuid,
        #[arg(
            long,
            default_value_t = DEFAULT_COHORT_MONTHS,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_COHORT_MONTHS as u64)
        )]
        months: usize,
        #[arg(long, default_value_t = DEFAULT_AT_RISK_LIMIT)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct ComplianceArgs {
    #[arg(long)]
    verified: bool,
    #[arg(long, default_value = "unknown")]
    license: LicenseStatus,
    #[arg(long)]
    rating: Option<f64>,
    #[arg(long, default_value_t = 0)]
    bookings: i64,
    #[arg(long, default_value_t = 0.0)]
    revenue: f64,
    #[arg(long, default_value_t = 0)]
    employees: i64,
    #[arg(long)]
    max_staff: Option<i64>,
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn score_salon(args: &ComplianceArgs, json: bool) -> anyhow::Result<()> {
    let compliance = scoring::compute_compliance(&ComplianceInput {
        is_verified: args.verified,
        license_status: args.license,
        rating_average: args.rating,
        total_bookings: args.bookings,
        total_revenue: args.revenue,
        employee_count: args.employees,
        max_staff: args.max_staff.unwrap_or(0),
    });
    let health = scoring::calculate_health_score(&HealthInput {
        rating_average: args.rating,
        total_bookings: args.bookings,
        total_revenue: args.revenue,
        employee_count: args.employees,
        max_staff: args.max_staff,
    });

    if json {
        return print_json(&serde_json::json!({
            "compliance": compliance,
            "health_score": health,
        }));
    }
    println!(
        "Compliance {} ({:?} risk), health {}",
        compliance.score, compliance.level, health
    );
    for issue in &compliance.issues {
        println!("- {issue}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let now = Utc::now();

    if let Commands::Compliance(args) = &cli.command {
        return score_salon(args, cli.json);
    }

    let pool = connect().await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let salon_id = db::seed(&pool).await?;
            println!("Seed data inserted for salon {salon_id}.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} appointments from {}.", csv.display());
        }
        Commands::Segments { salon, csv } => {
            let segments = insights::customer_segments(&pool, salon, now).await?;
            if let Some(path) = csv {
                report::write_csv(&path, &segments.customers)?;
                log::info!("wrote {} customers to {}", segments.customers.len(), path.display());
            }
            if cli.json {
                return print_json(&segments);
            }

            if segments.customers.is_empty() {
                println!("No completed visits for this salon.");
                return Ok(());
            }
            println!("Segment mix across {} customers:", segments.customers.len());
            for (segment, count) in &segments.breakdown {
                println!("- {segment}: {count}");
            }
            println!(
                "Retention {:.1}%, average lifetime value {:.2}",
                segments.summary.retention_rate, segments.summary.average_lifetime_value
            );
        }
        Commands::Cohorts { salon, months } => {
            let cohorts = insights::cohort_retention(&pool, salon, months, now).await?;
            if cli.json {
                return print_json(&cohorts);
            }

            for cohort in &cohorts {
                let retention: Vec<String> =
                    cohort.retention.iter().map(|r| format!("{r:.1}%")).collect();
                println!(
                    "{} ({} customers): {}",
                    cohort.cohort_label,
                    cohort.size,
                    retention.join(" ")
                );
            }
        }
        Commands::AtRisk { salon, limit, csv } => {
            let customers = insights::at_risk_customers(&pool, salon, limit, now).await?;
            if let Some(path) = csv {
                report::write_csv(&path, &customers)?;
            }
            if cli.json {
                return print_json(&customers);
            }

            if customers.is_empty() {
                println!("No customers at risk.");
                return Ok(());
            }
            println!("Customers at risk of churning:");
            for customer in &customers {
                println!(
                    "- {} ({}) {} days since last visit, {} visits",
                    customer.name, customer.email, customer.days_since_last_visit, customer.visit_count
                );
            }
        }
        Commands::Reactivation { salon, csv } => {
            let candidates = insights::reactivation_candidates(&pool, salon, now).await?;
            if let Some(path) = csv {
                report::write_csv(&path, &candidates.customers)?;
            }
            if cli.json {
                return print_json(&candidates);
            }

            println!("{} reactivation opportunities:", candidates.total_opportunities);
            for customer in &candidates.customers {
                println!(
                    "- {} ({}) last visit {}",
                    customer.name,
                    customer.email,
                    customer.last_visit.format("%Y-%m-%d")
                );
            }
        }
        Commands::ChurnRisk { salon, customer } => {
            let assessment = insights::customer_churn_risk(&pool, salon, customer, now).await?;
            if cli.json {
                return print_json(&assessment);
            }

            println!(
                "Churn risk {:?} (score {}) over {} appointments",
                assessment.level, assessment.score, assessment.total_visits
            );
            for factor in &assessment.factors {
                println!("- {factor}");
            }
            println!("{}", assessment.recommendation);
        }
        Commands::Clv { salon, customer } => {
            let value = insights::customer_lifetime_value(&pool, salon, customer).await?;
            if cli.json {
                return print_json(&value);
            }

            if value.visit_count == 0 {
                println!("No completed visits for this customer.");
                return Ok(());
            }
            println!(
                "{} visits over {} days, every {} days on average",
                value.visit_count, value.tenure_days, value.avg_days_between_visits
            );
            println!(
                "Lifetime value {:.2} (average order {:.2}), projected {:.2} over three years",
                value.lifetime_value, value.average_order_value, value.projected_ltv
            );
        }
        Commands::Salons => {
            let overview = insights::salon_overview(&pool, now.date_naive()).await?;
            if cli.json {
                return print_json(&overview);
            }
            print!("{}", report::build_salon_report(&overview));
        }
        Commands::Report {
            salon,
            months,
            limit,
            out,
        } => {
            let dashboard = insights::salon_dashboard(&pool, salon, months, limit, now).await?;
            if cli.json {
                return print_json(&dashboard);
            }
            let report = report::build_report(&salon.to_string(), &dashboard);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Compliance(args) => score_salon(&args, cli.json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const SALON: &str = "6f1c2a7e-3b5d-4c8e-9a01-5d7e2f4b8c10";

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_defaults_follow_library_constants() {
        let cli = Cli::try_parse_from(["salon-analytics", "report", "--salon", SALON]).unwrap();
        match cli.command {
            Commands::Report { months, limit, .. } => {
                assert_eq!(months, DEFAULT_COHORT_MONTHS);
                assert_eq!(limit, DEFAULT_AT_RISK_LIMIT);
            }
            _ => panic!("expected the report command"),
        }
    }

    #[test]
    fn cohort_months_outside_range_are_rejected() {
        let too_many = (MAX_COHORT_MONTHS + 1).to_string();
        for months in ["0", too_many.as_str(), "18446744073709551616"] {
            let parsed = Cli::try_parse_from([
                "salon-analytics",
                "cohorts",
                "--salon",
                SALON,
                "--months",
                months,
            ]);
            assert!(parsed.is_err(), "{months} should be rejected");
        }

        let cli = Cli::try_parse_from(["salon-analytics", "cohorts", "--salon", SALON, "--months", "60"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Cohorts { months: 60, .. }));
    }

    #[test]
    fn clv_takes_salon_and_customer() {
        let cli = Cli::try_parse_from([
            "salon-analytics",
            "--json",
            "clv",
            "--salon",
            SALON,
            "--customer",
            SALON,
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Clv { .. }));
    }
}
