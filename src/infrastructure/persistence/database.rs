use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::fs;
use tracing::info;

/// Shared SQLite pool plus schema bootstrap. WAL mode so the periodic
/// reconciliation sweeper can read `trades` while a trade executor writes a
/// new pending row without blocking each other.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(db_url, "connected to database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                pair TEXT NOT NULL,
                status TEXT NOT NULL,
                signals_json TEXT NOT NULL,
                confirmation_seconds INTEGER NOT NULL,
                cooldown_seconds INTEGER NOT NULL,
                position_size_usd TEXT NOT NULL,
                buy_threshold TEXT NOT NULL,
                sell_threshold TEXT NOT NULL,
                skip_on_low_balance INTEGER NOT NULL,
                confirmation_start_at TEXT,
                last_action_being_confirmed TEXT,
                last_combined_score TEXT,
                last_evaluated_at TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create bots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                order_id TEXT UNIQUE,
                triggered_by TEXT NOT NULL,
                product_id TEXT NOT NULL,
                side TEXT NOT NULL,
                size_usd TEXT NOT NULL,
                size_crypto TEXT NOT NULL,
                price TEXT NOT NULL,
                commission_usd TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                filled_at TEXT,
                signal_context_json TEXT
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_bot ON trades (triggered_by, status)")
            .execute(&mut *conn)
            .await
            .context("failed to create trades bot index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_pair ON trades (product_id, status)")
            .execute(&mut *conn)
            .await
            .context("failed to create trades pair index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bot_id TEXT NOT NULL,
                evaluated_at TEXT NOT NULL,
                scores_json TEXT NOT NULL,
                combined_score TEXT NOT NULL,
                action TEXT NOT NULL,
                confirming INTEGER NOT NULL,
                progress TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create signal_history table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signal_history_bot ON signal_history (bot_id, evaluated_at)")
            .execute(&mut *conn)
            .await
            .context("failed to create signal_history index")?;

        info!("database schema initialized");
        Ok(())
    }
}
