use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::domain::bot::{Bot, BotStatus, SignalConfig};
use crate::domain::errors::StoreError;
use crate::domain::repositories::{BotRepository, TradeRepository};
use crate::domain::signal::SignalKind;
use crate::domain::trade::{Side, Trade, TradeStatus};

fn fatal(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e
        && db_err.is_unique_violation()
    {
        return StoreError::Fatal {
            reason: format!("unique constraint violated: {db_err}"),
        };
    }
    StoreError::Fatal { reason: e.to_string() }
}

fn status_str(status: TradeStatus) -> &'static str {
    status.as_str()
}

fn parse_status(s: &str) -> TradeStatus {
    match s {
        "completed" => TradeStatus::Completed,
        "failed" => TradeStatus::Failed,
        "cancelled" => TradeStatus::Cancelled,
        _ => TradeStatus::Pending,
    }
}

fn row_to_trade(row: SqliteRow) -> Result<Trade, StoreError> {
    let side_str: String = row.try_get("side").map_err(fatal)?;
    let side = if side_str == "BUY" { Side::Buy } else { Side::Sell };

    let parse_dec = |col: &str| -> Decimal {
        row.try_get::<String, _>(col)
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or_default()
    };

    let signal_context: Option<serde_json::Value> = row
        .try_get::<Option<String>, _>("signal_context_json")
        .map_err(fatal)?
        .and_then(|s| serde_json::from_str(&s).ok());

    Ok(Trade {
        id: row.try_get("id").map_err(fatal)?,
        order_id: row.try_get("order_id").map_err(fatal)?,
        triggered_by: row.try_get("triggered_by").map_err(fatal)?,
        product_id: row.try_get("product_id").map_err(fatal)?,
        side,
        size_usd: parse_dec("size_usd"),
        size_crypto: parse_dec("size_crypto"),
        price: parse_dec("price"),
        commission_usd: parse_dec("commission_usd"),
        status: parse_status(&row.try_get::<String, _>("status").map_err(fatal)?),
        created_at: row.try_get("created_at").map_err(fatal)?,
        filled_at: row.try_get("filled_at").map_err(fatal)?,
        signal_context,
    })
}

fn row_to_bot(row: SqliteRow) -> Result<Bot, StoreError> {
    let status_str: String = row.try_get("status").map_err(fatal)?;
    let status = match status_str.as_str() {
        "RUNNING" => BotStatus::Running,
        "ERROR" => BotStatus::Error,
        _ => BotStatus::Stopped,
    };

    let signals_json: String = row.try_get("signals_json").map_err(fatal)?;
    let signals: HashMap<SignalKind, SignalConfig> =
        serde_json::from_str(&signals_json).map_err(|e| StoreError::Fatal { reason: e.to_string() })?;

    let parse_dec = |col: &str| -> Decimal {
        row.try_get::<String, _>(col)
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or_default()
    };

    let last_combined_score = row
        .try_get::<Option<String>, _>("last_combined_score")
        .map_err(fatal)?
        .and_then(|s| Decimal::from_str(&s).ok());

    Ok(Bot {
        id: row.try_get("id").map_err(fatal)?,
        name: row.try_get("name").map_err(fatal)?,
        pair: row.try_get("pair").map_err(fatal)?,
        status,
        signals,
        confirmation_seconds: row.try_get("confirmation_seconds").map_err(fatal)?,
        cooldown_seconds: row.try_get("cooldown_seconds").map_err(fatal)?,
        position_size_usd: parse_dec("position_size_usd"),
        buy_threshold: parse_dec("buy_threshold"),
        sell_threshold: parse_dec("sell_threshold"),
        skip_on_low_balance: row.try_get::<i64, _>("skip_on_low_balance").map_err(fatal)? != 0,
        confirmation_start_at: row.try_get("confirmation_start_at").map_err(fatal)?,
        last_action_being_confirmed: row.try_get("last_action_being_confirmed").map_err(fatal)?,
        last_combined_score,
        last_evaluated_at: row.try_get("last_evaluated_at").map_err(fatal)?,
    })
}

pub struct SqliteBotRepository {
    pool: SqlitePool,
}

impl SqliteBotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn write_config(&self, bot: &Bot, reset_confirmation: bool) -> Result<(), StoreError> {
        let signals_json = serde_json::to_string(&bot.signals).map_err(|e| StoreError::Fatal { reason: e.to_string() })?;
        let (confirmation_start_at, last_action_being_confirmed) = if reset_confirmation {
            (None, None)
        } else {
            (bot.confirmation_start_at, bot.last_action_being_confirmed.clone())
        };

        sqlx::query(
            r#"
            UPDATE bots SET
                name = ?, pair = ?, status = ?, signals_json = ?,
                confirmation_seconds = ?, cooldown_seconds = ?, position_size_usd = ?,
                buy_threshold = ?, sell_threshold = ?, skip_on_low_balance = ?,
                confirmation_start_at = ?, last_action_being_confirmed = ?
            WHERE id = ?
            "#,
        )
        .bind(&bot.name)
        .bind(&bot.pair)
        .bind(bot.status.as_str())
        .bind(signals_json)
        .bind(bot.confirmation_seconds)
        .bind(bot.cooldown_seconds)
        .bind(bot.position_size_usd.to_string())
        .bind(bot.buy_threshold.to_string())
        .bind(bot.sell_threshold.to_string())
        .bind(bot.skip_on_low_balance as i64)
        .bind(confirmation_start_at)
        .bind(last_action_being_confirmed)
        .bind(&bot.id)
        .execute(&self.pool)
        .await
        .map_err(fatal)?;

        Ok(())
    }
}

#[async_trait]
impl BotRepository for SqliteBotRepository {
    async fn create(&self, bot: &Bot) -> Result<(), StoreError> {
        let signals_json = serde_json::to_string(&bot.signals).map_err(|e| StoreError::Fatal { reason: e.to_string() })?;

        sqlx::query(
            r#"
            INSERT INTO bots (
                id, name, pair, status, signals_json, confirmation_seconds, cooldown_seconds,
                position_size_usd, buy_threshold, sell_threshold, skip_on_low_balance,
                confirmation_start_at, last_action_being_confirmed, last_combined_score, last_evaluated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bot.id)
        .bind(&bot.name)
        .bind(&bot.pair)
        .bind(bot.status.as_str())
        .bind(signals_json)
        .bind(bot.confirmation_seconds)
        .bind(bot.cooldown_seconds)
        .bind(bot.position_size_usd.to_string())
        .bind(bot.buy_threshold.to_string())
        .bind(bot.sell_threshold.to_string())
        .bind(bot.skip_on_low_balance as i64)
        .bind(bot.confirmation_start_at)
        .bind(bot.last_action_being_confirmed.clone())
        .bind(bot.last_combined_score.map(|d| d.to_string()))
        .bind(bot.last_evaluated_at)
        .execute(&self.pool)
        .await
        .map_err(fatal)?;

        Ok(())
    }

    async fn update(&self, bot: &Bot) -> Result<(), StoreError> {
        self.write_config(bot, false).await
    }

    async fn get(&self, id: &str) -> Result<Bot, StoreError> {
        let row = sqlx::query("SELECT * FROM bots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(fatal)?
            .ok_or_else(|| StoreError::BotNotFound { bot_id: id.to_string() })?;
        row_to_bot(row)
    }

    async fn list(&self) -> Result<Vec<Bot>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bots").fetch_all(&self.pool).await.map_err(fatal)?;
        rows.into_iter().map(row_to_bot).collect()
    }

    async fn update_config_and_reset_confirmation(&self, bot: &Bot) -> Result<(), StoreError> {
        self.write_config(bot, true).await
    }

    async fn update_evaluation_state(&self, bot: &Bot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bots SET
                confirmation_start_at = ?, last_action_being_confirmed = ?,
                last_combined_score = ?, last_evaluated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(bot.confirmation_start_at)
        .bind(bot.last_action_being_confirmed.clone())
        .bind(bot.last_combined_score.map(|d| d.to_string()))
        .bind(bot.last_evaluated_at)
        .bind(&bot.id)
        .execute(&self.pool)
        .await
        .map_err(fatal)?;

        Ok(())
    }
}

pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn insert(&self, trade: &Trade) -> Result<(), StoreError> {
        let signal_context_json = trade
            .signal_context
            .as_ref()
            .map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO trades (
                id, order_id, triggered_by, product_id, side, size_usd, size_crypto,
                price, commission_usd, status, created_at, filled_at, signal_context_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.order_id)
        .bind(&trade.triggered_by)
        .bind(&trade.product_id)
        .bind(trade.side.as_str())
        .bind(trade.size_usd.to_string())
        .bind(trade.size_crypto.to_string())
        .bind(trade.price.to_string())
        .bind(trade.commission_usd.to_string())
        .bind(status_str(trade.status))
        .bind(trade.created_at)
        .bind(trade.filled_at)
        .bind(signal_context_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e
                && db_err.is_unique_violation()
            {
                return StoreError::DuplicateOrderId {
                    order_id: trade.order_id.clone().unwrap_or_default(),
                };
            }
            fatal(e)
        })?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition_status(
        &self,
        trade_id: &str,
        expected_status: TradeStatus,
        new_status: TradeStatus,
        order_id: Option<&str>,
        filled_price: Option<Decimal>,
        filled_size: Option<Decimal>,
        commission_usd: Option<Decimal>,
        filled_at: Option<DateTime<Utc>>,
        confirmed_size_usd: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(fatal)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(fatal)?;

        let row = match sqlx::query("SELECT status, size_usd FROM trades WHERE id = ?")
            .bind(trade_id)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(StoreError::Fatal {
                    reason: format!("trade {trade_id} not found"),
                });
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(fatal(e));
            }
        };

        let current_status_str: String = row.try_get("status").map_err(fatal)?;
        let current_status = parse_status(&current_status_str);
        if current_status != expected_status {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(StoreError::Conflict {
                expected: expected_status.as_str().to_string(),
                actual: current_status.as_str().to_string(),
            });
        }

        let existing_size_usd: String = row.try_get("size_usd").map_err(fatal)?;
        let size_usd = Decimal::from_str(&existing_size_usd).unwrap_or_default();
        let size_crypto = filled_size.unwrap_or_else(|| {
            if let Some(price) = filled_price.filter(|p| !p.is_zero()) {
                size_usd / price
            } else {
                Decimal::ZERO
            }
        });

        let result = sqlx::query(
            r#"
            UPDATE trades SET
                status = ?, order_id = COALESCE(?, order_id), price = COALESCE(?, price),
                size_crypto = COALESCE(?, size_crypto), commission_usd = COALESCE(?, commission_usd),
                filled_at = COALESCE(?, filled_at), size_usd = COALESCE(?, size_usd)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status_str(new_status))
        .bind(order_id)
        .bind(filled_price.map(|d| d.to_string()))
        .bind(if filled_size.is_some() || filled_price.is_some() {
            Some(size_crypto.to_string())
        } else {
            None
        })
        .bind(commission_usd.map(|d| d.to_string()))
        .bind(filled_at)
        .bind(confirmed_size_usd.filter(|d| !d.is_zero()).map(|d| d.to_string()))
        .bind(trade_id)
        .bind(status_str(expected_status))
        .execute(&mut *conn)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.is_unique_violation()
                {
                    return Err(StoreError::DuplicateOrderId {
                        order_id: order_id.unwrap_or_default().to_string(),
                    });
                }
                return Err(fatal(e));
            }
        };

        if result.rows_affected() == 0 {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(StoreError::Conflict {
                expected: expected_status.as_str().to_string(),
                actual: current_status.as_str().to_string(),
            });
        }

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(fatal)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Trade, StoreError> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(fatal)?
            .ok_or_else(|| StoreError::Fatal {
                reason: format!("trade {id} not found"),
            })?;
        row_to_trade(row)
    }

    async fn find_pending_for_bot(&self, bot_id: &str) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query("SELECT * FROM trades WHERE triggered_by = ? AND status = 'pending'")
            .bind(format!("bot:{bot_id}"))
            .fetch_all(&self.pool)
            .await
            .map_err(fatal)?;
        rows.into_iter().map(row_to_trade).collect()
    }

    async fn find_last_completed_for_bot(&self, bot_id: &str) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM trades WHERE triggered_by = ? AND status = 'completed' ORDER BY filled_at DESC LIMIT 1",
        )
        .bind(format!("bot:{bot_id}"))
        .fetch_optional(&self.pool)
        .await
        .map_err(fatal)?;
        row.map(row_to_trade).transpose()
    }

    async fn find_completed_for_pair(&self, pair: &str) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query("SELECT * FROM trades WHERE product_id = ? AND status = 'completed' ORDER BY filled_at ASC")
            .bind(pair)
            .fetch_all(&self.pool)
            .await
            .map_err(fatal)?;
        rows.into_iter().map(row_to_trade).collect()
    }

    async fn find_pending_older_than(&self, age_seconds: i64) -> Result<Vec<Trade>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(age_seconds);
        let rows = sqlx::query("SELECT * FROM trades WHERE status = 'pending' AND created_at < ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(fatal)?;
        rows.into_iter().map(row_to_trade).collect()
    }

    async fn find_by_filters(
        &self,
        bot_id: Option<&str>,
        pair: Option<&str>,
        status: Option<TradeStatus>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, StoreError> {
        let mut query = String::from("SELECT * FROM trades WHERE 1=1");
        if bot_id.is_some() {
            query.push_str(" AND triggered_by = ?");
        }
        if pair.is_some() {
            query.push_str(" AND product_id = ?");
        }
        if status.is_some() {
            query.push_str(" AND status = ?");
        }
        if since.is_some() {
            query.push_str(" AND created_at >= ?");
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query(&query);
        if let Some(b) = bot_id {
            q = q.bind(format!("bot:{b}"));
        }
        if let Some(p) = pair {
            q = q.bind(p);
        }
        if let Some(s) = status {
            q = q.bind(status_str(s));
        }
        if let Some(t) = since {
            q = q.bind(t);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(fatal)?;
        rows.into_iter().map(row_to_trade).collect()
    }
}
