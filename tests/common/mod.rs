//! Shared scaffolding for end-to-end scenario tests: a throwaway on-disk
//! SQLite database per test (SQLite's in-memory mode does not share state
//! across pooled connections) plus small helpers for building bots.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tradeforge_engine::domain::bot::{Bot, BotStatus};
use tradeforge_engine::infrastructure::persistence::{Database, SqliteBotRepository, SqliteTradeRepository};

pub async fn fresh_database() -> Database {
    let path = std::env::temp_dir().join(format!("tradeforge-test-{}.db", uuid::Uuid::new_v4()));
    Database::new(&format!("sqlite://{}", path.display()))
        .await
        .expect("failed to open scenario test database")
}

pub async fn fresh_repos() -> (Arc<SqliteBotRepository>, Arc<SqliteTradeRepository>) {
    let db = fresh_database().await;
    (
        Arc::new(SqliteBotRepository::new(db.pool.clone())),
        Arc::new(SqliteTradeRepository::new(db.pool.clone())),
    )
}

pub fn sample_bot(id: &str, pair: &str) -> Bot {
    Bot {
        id: id.to_string(),
        name: format!("bot-{id}"),
        pair: pair.to_string(),
        status: BotStatus::Running,
        signals: HashMap::new(),
        confirmation_seconds: 300,
        cooldown_seconds: 900,
        position_size_usd: dec!(50),
        buy_threshold: dec!(-0.5),
        sell_threshold: dec!(0.5),
        skip_on_low_balance: false,
        confirmation_start_at: None,
        last_action_being_confirmed: None,
        last_combined_score: None,
        last_evaluated_at: None,
    }
}

pub fn tiny_position_size() -> Decimal {
    dec!(50)
}
