use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::insights::AnalyticsSource;
use crate::models::{
    AppointmentRecord, AppointmentStatus, CustomerProfile, SalonSnapshot, STATUS_COMPLETED,
};

pub const SEED_SALON_ID: &str = "6f1c2a7e-3b5d-4c8e-9a01-5d7e2f4b8c10";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_profile(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    phone: Option<&str>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO salon_analytics.profiles (id, full_name, email, phone)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            phone = COALESCE(EXCLUDED.phone, salon_analytics.profiles.phone)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(phone)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_appointment(
    pool: &PgPool,
    salon_id: Uuid,
    customer_id: Option<Uuid>,
    start_time: Option<DateTime<Utc>>,
    status: AppointmentStatus,
    total_price: Option<f64>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO salon_analytics.appointments
        (id, salon_id, customer_id, start_time, status, total_price, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(salon_id)
    .bind(customer_id)
    .bind(start_time)
    .bind(status.as_str())
    .bind(total_price)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn ensure_salon(pool: &PgPool, salon_id: Uuid, name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO salon_analytics.salons (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(salon_id)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Loads a small salon with customers spread across every segment. Visit
/// dates are relative to today so the analytics stay interesting.
pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let salon_id = Uuid::parse_str(SEED_SALON_ID)?;
    let license_expires_at = Utc::now().date_naive() + Duration::days(21);

    sqlx::query(
        r#"
        INSERT INTO salon_analytics.salons
        (id, name, is_verified, license_expires_at, rating_average, employee_count, max_staff)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET license_expires_at = EXCLUDED.license_expires_at
        "#,
    )
    .bind(salon_id)
    .bind("Maple Street Studio")
    .bind(true)
    .bind(license_expires_at)
    .bind(4.6_f64)
    .bind(6_i64)
    .bind(8_i64)
    .execute(pool)
    .await?;

    // name, email, phone, price per visit, completed visits and cancellations (days ago)
    let customers: Vec<(&str, &str, Option<&str>, f64, Vec<i64>, Vec<i64>)> = vec![
        (
            "Avery Lee",
            "avery.lee@maplestudio.com",
            Some("555-0101"),
            135.0,
            vec![5, 19, 33, 48, 62, 77, 91, 105, 120, 134, 150, 170],
            vec![],
        ),
        (
            "Jules Moreno",
            "jules.moreno@maplestudio.com",
            Some("555-0102"),
            65.0,
            vec![12, 40, 70, 101, 130, 160],
            vec![],
        ),
        (
            "Kiara Patel",
            "kiara.patel@maplestudio.com",
            None,
            65.0,
            vec![52, 88, 120],
            vec![30],
        ),
        ("Sam Okafor", "sam.okafor@maplestudio.com", Some("555-0104"), 65.0, vec![8], vec![]),
        ("Mina Park", "mina.park@maplestudio.com", Some("555-0105"), 65.0, vec![75, 140], vec![]),
        ("Theo Grant", "theo.grant@maplestudio.com", None, 65.0, vec![210, 260, 330], vec![]),
    ];

    let now = Utc::now();
    for (name, email, phone, price, visits, cancellations) in customers {
        let customer_id = upsert_profile(pool, name, email, phone).await?;
        let rows = visits
            .into_iter()
            .map(|days| (days, AppointmentStatus::Completed, Some(price)))
            .chain(
                cancellations
                    .into_iter()
                    .map(|days| (days, AppointmentStatus::Cancelled, None)),
            );

        for (days_ago, status, total_price) in rows {
            let source_key = format!("seed-{email}-{}-{days_ago}", status.as_str());
            insert_appointment(
                pool,
                salon_id,
                Some(customer_id),
                Some(now - Duration::days(days_ago)),
                status,
                total_price,
                &source_key,
            )
            .await?;
        }
    }

    Ok(salon_id)
}

fn appointment_from_row(row: &sqlx::postgres::PgRow) -> AppointmentRecord {
    AppointmentRecord {
        customer_id: row.get("customer_id"),
        start_time: row.get("start_time"),
        status: row.get("status"),
        total_price: row.get("total_price"),
    }
}

pub async fn fetch_appointments(
    pool: &PgPool,
    salon_id: Uuid,
    since: Option<DateTime<Utc>>,
    completed_only: bool,
) -> anyhow::Result<Vec<AppointmentRecord>> {
    let mut query = String::from(
        "SELECT customer_id, start_time, status, total_price \
         FROM salon_analytics.appointments \
         WHERE salon_id = $1",
    );

    if since.is_some() {
        query.push_str(" AND start_time >= $2");
    }
    if completed_only {
        query.push_str(" AND status = '");
        query.push_str(STATUS_COMPLETED);
        query.push('\'');
    }

    let mut rows = sqlx::query(&query).bind(salon_id);
    if let Some(value) = since {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(appointment_from_row).collect())
}

pub async fn fetch_customer_appointments(
    pool: &PgPool,
    salon_id: Uuid,
    customer_id: Uuid,
) -> anyhow::Result<Vec<AppointmentRecord>> {
    let records = sqlx::query(
        r#"
        SELECT customer_id, start_time, status, total_price
        FROM salon_analytics.appointments
        WHERE salon_id = $1 AND customer_id = $2
        ORDER BY start_time DESC
        "#,
    )
    .bind(salon_id)
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(records.iter().map(appointment_from_row).collect())
}

pub async fn fetch_profiles(pool: &PgPool, ids: &[Uuid]) -> anyhow::Result<Vec<CustomerProfile>> {
    let records = sqlx::query(
        "SELECT id, full_name, email, phone FROM salon_analytics.profiles WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut profiles = Vec::new();
    for row in records {
        profiles.push(CustomerProfile {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            phone: row.get("phone"),
        });
    }

    Ok(profiles)
}

pub async fn fetch_salon_snapshots(pool: &PgPool) -> anyhow::Result<Vec<SalonSnapshot>> {
    let records = sqlx::query(
        r#"
        SELECT id, name, is_verified, license_expires_at, rating_average,
               total_bookings, total_revenue, employee_count, max_staff
        FROM salon_analytics.salon_overview
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut salons = Vec::new();
    for row in records {
        salons.push(SalonSnapshot {
            salon_id: row.get("id"),
            name: row.get("name"),
            is_verified: row.get("is_verified"),
            license_expires_at: row.get::<Option<NaiveDate>, _>("license_expires_at"),
            rating_average: row.get("rating_average"),
            total_bookings: row.get("total_bookings"),
            total_revenue: row.get("total_revenue"),
            employee_count: row.get("employee_count"),
            max_staff: row.get("max_staff"),
        });
    }

    Ok(salons)
}

impl AnalyticsSource for PgPool {
    async fn completed_appointments(
        &self,
        salon_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<AppointmentRecord>> {
        fetch_appointments(self, salon_id, since, true).await
    }

    async fn salon_appointments(
        &self,
        salon_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<AppointmentRecord>> {
        fetch_appointments(self, salon_id, since, false).await
    }

    async fn customer_appointments(
        &self,
        salon_id: Uuid,
        customer_id: Uuid,
    ) -> anyhow::Result<Vec<AppointmentRecord>> {
        fetch_customer_appointments(self, salon_id, customer_id).await
    }

    async fn profiles(&self, ids: &[Uuid]) -> anyhow::Result<Vec<CustomerProfile>> {
        fetch_profiles(self, ids).await
    }

    async fn salon_snapshots(&self) -> anyhow::Result<Vec<SalonSnapshot>> {
        fetch_salon_snapshots(self).await
    }
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    salon_id: Uuid,
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    start_time: Option<DateTime<Utc>>,
    status: String,
    total_price: Option<f64>,
    source_key: Option<String>,
}

/// Imports appointment history exported from the booking side. Rows without
/// an email are stored unattributed; re-imports are idempotent on `source_key`.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let status: AppointmentStatus = row
            .status
            .parse()
            .with_context(|| format!("row {}: invalid status", line + 2))?;

        ensure_salon(pool, row.salon_id, "Imported salon").await?;

        let customer_id = match row.email.as_deref().filter(|e| !e.is_empty()) {
            Some(email) => {
                let name = row.full_name.as_deref().unwrap_or("Unknown");
                Some(upsert_profile(pool, name, email, row.phone.as_deref()).await?)
            }
            None => None,
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_appointment(
            pool,
            row.salon_id,
            customer_id,
            row.start_time,
            status,
            row.total_price,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    log::info!("imported {inserted} appointments from {}", csv_path.display());
    Ok(inserted)
}
