//! Database initialization
//!
//! Creates the database on first run, applies the schema idempotently,
//! seeds the default question catalog and settings, then runs versioned
//! migrations.

use crate::config::ScaleConfig;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode: the scheduler loop and request handlers share this pool,
    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Bounded lock waits so a contended redemption fails fast rather than
    // hanging a request
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema_version_table(&pool).await?;
    create_settings_table(&pool).await?;
    init_default_settings(&pool).await?;

    create_customers_table(&pool).await?;
    create_org_units_table(&pool).await?;
    create_contacts_table(&pool).await?;
    create_questions_table(&pool).await?;
    create_assessments_table(&pool).await?;
    create_tokens_table(&pool).await?;

    // The responses score CHECK is rendered from the configured scale, so
    // the settings rows must exist before this table is created
    let scale = ScaleConfig::from_database(&pool).await;
    create_responses_table(&pool, scale).await?;

    seed_default_questions(&pool).await?;

    // Versioned migrations (idempotent - safe to call multiple times)
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values, and resets any
/// NULL values back to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Likert scale bounds (1-5 and 1-7 deployments exist)
    ensure_setting(pool, "scale_min", "1").await?;
    ensure_setting(pool, "scale_max", "5").await?;

    // Scoring thresholds, expressed on the canonical 1-5 scale and scaled
    // by scale_max/5 at classification time
    ensure_setting(pool, "severity_critical_threshold", "2.5").await?;
    ensure_setting(pool, "severity_warning_threshold", "3.5").await?;
    ensure_setting(pool, "gap_critical_threshold", "1.5").await?;
    ensure_setting(pool, "substitution_high_threshold", "3.5").await?;
    ensure_setting(pool, "substitution_low_threshold", "2.5").await?;
    ensure_setting(pool, "uniform_variance_threshold", "0.05").await?;

    // Scheduler settings
    ensure_setting(pool, "scheduler_enabled", "true").await?;
    ensure_setting(pool, "scheduler_interval_secs", "60").await?;
    ensure_setting(pool, "retention_hour", "3").await?;

    // Assessment defaults
    ensure_setting(pool, "default_min_responses", "3").await?;
    ensure_setting(pool, "default_sender_name", "Pejl").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // Use INSERT OR IGNORE to handle concurrent initialization race conditions
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a setting value, if present
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value)
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_customers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sender_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the org_units table
///
/// Organizational tree with denormalized full path and depth. Deleting a
/// unit cascades to all descendant units.
pub async fn create_org_units_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS org_units (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            parent_id TEXT REFERENCES org_units(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            headcount INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (depth >= 0),
            CHECK (headcount >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_org_units_customer ON org_units(customer_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_org_units_parent ON org_units(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the contacts table
///
/// Delivery targets per unit. Contact CRUD lives in the admin layer; this
/// core only reads it through the contact-lookup port.
pub async fn create_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL REFERENCES org_units(id) ON DELETE CASCADE,
            name TEXT,
            email TEXT,
            phone TEXT,
            is_leader INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contacts_unit ON contacts(unit_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the questions table
///
/// Questions are never deleted once referenced by a response, only
/// deactivated (active = 0). `customer_id` NULL marks the global default
/// catalog.
pub async fn create_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            customer_id TEXT REFERENCES customers(id) ON DELETE CASCADE,
            field TEXT NOT NULL CHECK (field IN ('MENING', 'TRYGHED', 'KAN', 'BESVAER')),
            text TEXT NOT NULL,
            reverse_scored INTEGER NOT NULL DEFAULT 0,
            sequence INTEGER NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (sequence >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_questions_customer ON questions(customer_id, active, sequence)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the assessments table
///
/// One scheduled round of survey collection targeting one unit.
/// `last_error` carries the most recent send failure so an administrator
/// sees why a scheduled assessment is stuck instead of an opaque status.
pub async fn create_assessments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            unit_id TEXT NOT NULL REFERENCES org_units(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            period TEXT,
            status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'scheduled', 'sent', 'cancelled')),
            scheduled_at TIMESTAMP,
            sent_at TIMESTAMP,
            include_leader_assessment INTEGER NOT NULL DEFAULT 1,
            min_responses INTEGER NOT NULL DEFAULT 3,
            last_error TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (min_responses >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assessments_due ON assessments(status, scheduled_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assessments_customer ON assessments(customer_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the tokens table
///
/// Single-use anonymous credentials. The opaque token string is the primary
/// key; the unique slot index makes concurrent issuance for the same
/// assessment+unit pair fail closed instead of doubling respondent slots.
pub async fn create_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tokens (
            token TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL REFERENCES assessments(id) ON DELETE CASCADE,
            unit_id TEXT NOT NULL REFERENCES org_units(id) ON DELETE CASCADE,
            respondent_category TEXT NOT NULL CHECK (respondent_category IN ('employee', 'leader_assess', 'leader_self')),
            slot INTEGER NOT NULL DEFAULT 0,
            is_used INTEGER NOT NULL DEFAULT 0,
            used_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (slot >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tokens_assessment ON tokens(assessment_id, unit_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_slot ON tokens(assessment_id, unit_id, respondent_category, slot)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the responses table
///
/// Append-only per-question scores. The score range CHECK is rendered from
/// the configured scale so the bound is enforced by storage, not only by
/// application validation.
pub async fn create_responses_table(pool: &SqlitePool, scale: ScaleConfig) -> Result<()> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            assessment_id TEXT NOT NULL REFERENCES assessments(id) ON DELETE CASCADE,
            unit_id TEXT NOT NULL REFERENCES org_units(id) ON DELETE CASCADE,
            question_id TEXT NOT NULL REFERENCES questions(id),
            respondent_category TEXT NOT NULL CHECK (respondent_category IN ('employee', 'leader_assess', 'leader_self')),
            score INTEGER NOT NULL,
            comment TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (score >= {} AND score <= {})
        )
        "#,
        scale.min, scale.max
    );

    sqlx::query(&ddl).execute(pool).await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_responses_assessment ON responses(assessment_id, respondent_category)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed the default question catalog
///
/// Fixed ids keep the seed idempotent across restarts. Three items per
/// dimension; the friction items agree-means-friction, so they carry the
/// reverse_scored flag, as does the safety item about fear of mistakes.
pub async fn seed_default_questions(pool: &SqlitePool) -> Result<()> {
    let defaults: Vec<(&str, &str, &str, i64, i64)> = vec![
        // (id, field, text, reverse_scored, sequence)
        (
            "00000000-0000-0000-0000-000000000101",
            "MENING",
            "I understand how my work contributes to the goals of the organization",
            0,
            10,
        ),
        (
            "00000000-0000-0000-0000-000000000102",
            "MENING",
            "My daily tasks feel meaningful to me",
            0,
            20,
        ),
        (
            "00000000-0000-0000-0000-000000000103",
            "MENING",
            "I know what is expected of me in my role",
            0,
            30,
        ),
        (
            "00000000-0000-0000-0000-000000000201",
            "TRYGHED",
            "I can raise problems and difficult issues with my unit",
            0,
            40,
        ),
        (
            "00000000-0000-0000-0000-000000000202",
            "TRYGHED",
            "I am afraid to admit mistakes in my unit",
            1,
            50,
        ),
        (
            "00000000-0000-0000-0000-000000000203",
            "TRYGHED",
            "I can ask colleagues for help without hesitation",
            0,
            60,
        ),
        (
            "00000000-0000-0000-0000-000000000301",
            "KAN",
            "I have the skills I need to do my job well",
            0,
            70,
        ),
        (
            "00000000-0000-0000-0000-000000000302",
            "KAN",
            "I get the training I need when my tasks change",
            0,
            80,
        ),
        (
            "00000000-0000-0000-0000-000000000303",
            "KAN",
            "I know where to find the information my work requires",
            0,
            90,
        ),
        (
            "00000000-0000-0000-0000-000000000401",
            "BESVAER",
            "I spend time on procedures that add no value to my work",
            1,
            100,
        ),
        (
            "00000000-0000-0000-0000-000000000402",
            "BESVAER",
            "The tools I depend on slow me down",
            1,
            110,
        ),
        (
            "00000000-0000-0000-0000-000000000403",
            "BESVAER",
            "I have to work around broken processes to get things done",
            1,
            120,
        ),
    ];

    for (id, field, text, reverse_scored, sequence) in defaults {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO questions (id, customer_id, field, text, reverse_scored, sequence, is_default, active)
            VALUES (?, NULL, ?, ?, ?, ?, 1, 1)
            "#,
        )
        .bind(id)
        .bind(field)
        .bind(text)
        .bind(reverse_scored)
        .bind(sequence)
        .execute(pool)
        .await?;
    }

    Ok(())
}
