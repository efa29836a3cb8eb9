//! Application bootstrap: wires every component per spec §2's flow and
//! exposes the `ControlApi`. Grounded on the teacher's
//! `application::system::System`/`Application::build` bootstrap shape: one
//! struct holding `Arc`s to every service, a `start()` that spawns the
//! background tasks, and a `handle` the binary holds onto for shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::control::{BotStatusSnapshot, ControlApi, PortfolioTotals, TradeFilters};
use crate::application::ledger::PortfolioLedger;
use crate::application::safety::{SafetyLimits, SafetyState};
use crate::application::signals::evaluator::{SignalEvaluator, TemperatureThresholds};
use crate::application::trading::decider::{BalanceSnapshot, TradeDecider};
use crate::application::trading::executor::TradeExecutor;
use crate::application::trading::order_monitor::{OrderMonitor, OrderMonitorConfig};
use crate::application::trading::sweeper::{ReconciliationSweeper, SweeperConfig};
use crate::application::market_data::MarketDataCache;
use crate::config::Config;
use crate::domain::bot::{Bot, BotStatus};
use crate::domain::errors::StoreError;
use crate::domain::events::TradingEvent;
use crate::domain::ports::{Clock, DistributedMutex, ExchangeGateway};
use crate::domain::repositories::{BotRepository, TradeRepository};
use crate::domain::trade::TradeStatus;
use crate::infrastructure::event_bus::EventBus;

pub struct Application {
    gateway: Arc<dyn ExchangeGateway>,
    bots: Arc<dyn BotRepository>,
    trades: Arc<dyn TradeRepository>,
    event_bus: Arc<EventBus>,
    cache: Arc<MarketDataCache>,
    evaluator: Arc<SignalEvaluator>,
    executor: Arc<TradeExecutor>,
    sweeper: Arc<ReconciliationSweeper>,
    safety: Arc<RwLock<SafetyState>>,
    safety_limits: SafetyLimits,
    clock: Arc<dyn Clock>,
    known_deposits_usd: rust_decimal::Decimal,
    /// Bots with an evaluation currently running, whether triggered by a
    /// ticker update or the periodic safety net. A bot already in this set
    /// is skipped rather than queued, per "at most one evaluation per bot
    /// in flight, drop don't queue".
    in_flight_evaluations: Arc<tokio::sync::Mutex<HashSet<String>>>,
}

pub struct ApplicationHandle {
    pub sweeper_task: tokio::task::JoinHandle<()>,
    pub periodic_eval_task: tokio::task::JoinHandle<()>,
    pub ticker_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Application {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        config: &Config,
        gateway: Arc<dyn ExchangeGateway>,
        mutex: Arc<dyn DistributedMutex>,
        bots: Arc<dyn BotRepository>,
        trades: Arc<dyn TradeRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.engine.event_bus_backlog));
        let cache = Arc::new(MarketDataCache::new(
            Duration::from_secs(config.engine.candle_ttl_seconds as u64),
            Duration::from_secs(config.engine.stale_grace_seconds as u64),
            config.engine.cache_capacity,
        ));

        let evaluator = Arc::new(SignalEvaluator::new(
            cache.clone(),
            gateway.clone(),
            clock.clone(),
            TemperatureThresholds {
                hot: config.engine.temperature_hot,
                warm: config.engine.temperature_warm,
                cool: config.engine.temperature_cool,
            },
        ));

        let order_monitor = Arc::new(OrderMonitor::new(
            gateway.clone(),
            trades.clone(),
            event_bus.clone(),
            OrderMonitorConfig::default(),
        ));

        let executor = Arc::new(TradeExecutor::new(
            gateway.clone(),
            mutex,
            bots.clone(),
            trades.clone(),
            event_bus.clone(),
            order_monitor,
        ));

        let sweeper = Arc::new(ReconciliationSweeper::new(
            gateway.clone(),
            trades.clone(),
            event_bus.clone(),
            SweeperConfig::default(),
        ));

        Self {
            gateway,
            bots,
            trades,
            event_bus,
            cache,
            evaluator,
            executor,
            sweeper,
            safety: Arc::new(RwLock::new(SafetyState::default())),
            safety_limits: SafetyLimits {
                max_daily_loss_usd: config.risk.max_daily_loss_usd,
                max_daily_trades: config.risk.max_daily_trades,
            },
            clock,
            known_deposits_usd: config.risk.known_deposits_usd,
            in_flight_evaluations: Arc::new(tokio::sync::Mutex::new(HashSet::new())),
        }
    }

    /// Starts streaming, the periodic safety-net tick, and one subscriber
    /// task per pair that triggers evaluation on every ticker update for
    /// the bots trading it — the two triggers spec §4.3 Scheduling
    /// requires.
    pub async fn start(self: &Arc<Self>, pairs: &[String]) -> anyhow::Result<ApplicationHandle> {
        self.gateway.start_streaming(pairs, self.event_bus.clone()).await?;

        let sweeper_task = self.sweeper.clone().spawn();

        let this = self.clone();
        let periodic_eval_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(5));
            loop {
                tick.tick().await;
                this.evaluate_all_bots().await;
            }
        });

        let mut ticker_tasks = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let mut rx = self.event_bus.subscribe(&format!("ticker.{pair}")).await;
            let this = self.clone();
            let pair = pair.clone();
            ticker_tasks.push(tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    if let TradingEvent::Ticker { pair: event_pair, .. } = event {
                        if event_pair == pair {
                            this.on_ticker(&pair).await;
                        }
                    }
                }
            }));
        }

        Ok(ApplicationHandle {
            sweeper_task,
            periodic_eval_task,
            ticker_tasks,
        })
    }

    /// Triggered by a fresh ticker tick for `pair`: spawns one guarded
    /// evaluation per running bot trading it, so a burst of ticks doesn't
    /// serialize behind a slow evaluation.
    async fn on_ticker(self: &Arc<Self>, pair: &str) {
        let Ok(bots) = self.bots.list().await else {
            return;
        };
        for bot in bots {
            if bot.status != BotStatus::Running || bot.pair != pair {
                continue;
            }
            let this = self.clone();
            tokio::spawn(async move { this.evaluate_one_guarded(bot).await });
        }
    }

    /// The periodic safety-net pass: one evaluation per running bot, using
    /// the same in-flight set as ticker-triggered evaluations so a bot
    /// already being evaluated off a ticker update is skipped here rather
    /// than evaluated twice concurrently.
    async fn evaluate_all_bots(self: &Arc<Self>) {
        let Ok(bots) = self.bots.list().await else {
            warn!("periodic evaluation: failed to list bots");
            return;
        };
        for bot in bots {
            if bot.status != BotStatus::Running {
                continue;
            }
            self.clone().evaluate_one_guarded(bot).await;
        }
    }

    /// Evaluates `bot`, skipping entirely if another evaluation for it is
    /// already running.
    async fn evaluate_one_guarded(self: Arc<Self>, bot: Bot) {
        {
            let mut in_flight = self.in_flight_evaluations.lock().await;
            if !in_flight.insert(bot.id.clone()) {
                return;
            }
        }
        if let Err(e) = self.evaluate_and_maybe_trade(&bot).await {
            warn!(bot_id = %bot.id, error = %e, "evaluation pass failed");
        }
        self.in_flight_evaluations.lock().await.remove(&bot.id);
    }

    pub async fn evaluate_and_maybe_trade(&self, bot: &Bot) -> anyhow::Result<()> {
        let (evaluation, next_state) = self.evaluator.evaluate(bot).await?;

        let mut updated = bot.clone();
        updated.last_combined_score = Some(evaluation.combined_score);
        updated.last_evaluated_at = Some(evaluation.evaluated_at);
        match next_state {
            crate::domain::confirmation::ConfirmationState::Idle => {
                updated.confirmation_start_at = None;
                updated.last_action_being_confirmed = None;
            }
            crate::domain::confirmation::ConfirmationState::Confirming { action, started_at } => {
                updated.confirmation_start_at = Some(started_at);
                updated.last_action_being_confirmed = Some(action.as_str().to_string());
            }
            crate::domain::confirmation::ConfirmationState::Confirmed { action } => {
                updated.confirmation_start_at = None;
                updated.last_action_being_confirmed = Some(action.as_str().to_string());
            }
        }
        let _ = self.bots.update_evaluation_state(&updated).await;

        let crate::domain::confirmation::ConfirmationState::Confirmed { action } = next_state else {
            return Ok(());
        };

        self.try_execute_confirmed(bot, action).await;
        Ok(())
    }

    async fn try_execute_confirmed(&self, bot: &Bot, action: crate::domain::signal::Action) {
        let pending = self
            .trades
            .find_pending_for_bot(&bot.id)
            .await
            .unwrap_or_default();
        let last_completed = self
            .trades
            .find_last_completed_for_bot(&bot.id)
            .await
            .ok()
            .flatten();

        let accounts = self.gateway.get_accounts().await.unwrap_or_default();
        let available_usd = accounts
            .iter()
            .find(|(_, b)| b.is_cash)
            .map(|(_, b)| b.available)
            .unwrap_or_default();
        let available_crypto = accounts
            .iter()
            .find(|(currency, _)| bot.pair.starts_with(currency.as_str()))
            .map(|(_, b)| b.available)
            .unwrap_or_default();
        let last_price = self
            .gateway
            .get_ticker(&bot.pair)
            .await
            .map(|t| t.price)
            .unwrap_or_default();

        let balance = BalanceSnapshot {
            available_usd,
            available_crypto,
            last_price,
        };

        let mut safety = self.safety.write().await;
        safety.roll_if_new_day();

        let decision = TradeDecider::decide(
            bot,
            action,
            self.clock.now(),
            !pending.is_empty(),
            last_completed.and_then(|t| t.filled_at),
            &balance,
            self.gateway.min_exchange_lot(&bot.pair),
            &safety,
            &self.safety_limits,
        );
        drop(safety);

        if !decision.approved {
            info!(bot_id = %bot.id, reason = decision.reason, "trade rejected by decider");
            return;
        }

        let Some(sizing) = decision.sizing else {
            return;
        };

        let side = match action {
            crate::domain::signal::Action::Buy => crate::domain::trade::Side::Buy,
            crate::domain::signal::Action::Sell => crate::domain::trade::Side::Sell,
            crate::domain::signal::Action::Hold => return,
        };

        match self.executor.execute(&bot.id, side, sizing, None).await {
            Ok(trade) => {
                if trade.status == TradeStatus::Completed {
                    let realized_loss = self.realized_loss_of(&bot.pair, &trade.id).await;
                    let mut safety = self.safety.write().await;
                    safety.record_trade(realized_loss);
                }
            }
            Err(e) => {
                warn!(bot_id = %bot.id, error = %e, "trade execution rejected or failed");
            }
        }
    }

    /// Isolates one completed trade's contribution to realized P&L by
    /// diffing the ledger's FIFO position with and without it.
    /// `PortfolioLedger::position` has no per-trade delta API since it's a
    /// pure rescan of the whole trade log, so a before/after comparison is
    /// the only way to attribute one trade's share of it. A `Buy` never
    /// realizes P&L, so this is `Decimal::ZERO` for one; a `Sell` yields the
    /// actual signed gain or loss it realized against its matched lots.
    async fn realized_loss_of(&self, pair: &str, trade_id: &str) -> rust_decimal::Decimal {
        let Ok(completed) = self.trades.find_completed_for_pair(pair).await else {
            return rust_decimal::Decimal::ZERO;
        };
        let after = PortfolioLedger::position(&completed);
        let prior: Vec<_> = completed.iter().filter(|t| t.id != trade_id).cloned().collect();
        let before = PortfolioLedger::position(&prior);
        let delta = after.realized_pnl - before.realized_pnl;
        if delta < rust_decimal::Decimal::ZERO { -delta } else { rust_decimal::Decimal::ZERO }
    }
}

#[async_trait]
impl ControlApi for Application {
    async fn create_bot(&self, bot: Bot) -> Result<String, StoreError> {
        bot.validate_weights().map_err(|reason| StoreError::Fatal { reason })?;
        self.bots.create(&bot).await?;
        Ok(bot.id)
    }

    async fn update_bot(&self, id: &str, patch: Bot) -> Result<(), StoreError> {
        let mut current = self.bots.get(id).await?;
        let strategy_changed = format!("{:?}", current.signals) != format!("{:?}", patch.signals)
            || current.buy_threshold != patch.buy_threshold
            || current.sell_threshold != patch.sell_threshold;

        current.signals = patch.signals;
        current.buy_threshold = patch.buy_threshold;
        current.sell_threshold = patch.sell_threshold;
        current.position_size_usd = patch.position_size_usd;
        current.cooldown_seconds = patch.cooldown_seconds;
        current.confirmation_seconds = patch.confirmation_seconds;
        current.skip_on_low_balance = patch.skip_on_low_balance;

        if strategy_changed {
            current.reset_confirmation();
            self.bots.update_config_and_reset_confirmation(&current).await
        } else {
            self.bots.update(&current).await
        }
    }

    async fn start_bot(&self, id: &str) -> Result<(), StoreError> {
        let mut bot = self.bots.get(id).await?;
        bot.status = BotStatus::Running;
        self.bots.update(&bot).await
    }

    async fn stop_bot(&self, id: &str) -> Result<(), StoreError> {
        let mut bot = self.bots.get(id).await?;
        bot.status = BotStatus::Stopped;
        self.bots.update(&bot).await
    }

    async fn emergency_stop(&self) {
        let mut safety = self.safety.write().await;
        safety.emergency_stop = true;
    }

    async fn get_bot_status(&self, id: &str) -> Result<BotStatusSnapshot, StoreError> {
        let bot = self.bots.get(id).await?;
        let (evaluation, _) = self
            .evaluator
            .evaluate(&bot)
            .await
            .map_err(|e| StoreError::Fatal { reason: e.to_string() })?;
        Ok(BotStatusSnapshot {
            temperature: self.evaluator.temperature_of(evaluation.combined_score),
            last_action: evaluation.action,
            last_combined_score: evaluation.combined_score,
            progress: evaluation.progress,
            bot,
        })
    }

    async fn get_portfolio(&self) -> Result<PortfolioTotals, StoreError> {
        let bots = self.bots.list().await?;
        let mut positions = Vec::new();
        let mut all_trades = Vec::new();
        let mut seen_pairs = HashMap::new();
        for bot in &bots {
            if seen_pairs.contains_key(&bot.pair) {
                continue;
            }
            seen_pairs.insert(bot.pair.clone(), ());
            let trades = self.trades.find_completed_for_pair(&bot.pair).await?;
            let position = PortfolioLedger::position(&trades);
            positions.push((bot.pair.clone(), position));
            all_trades.extend(trades);
        }
        let totals = PortfolioLedger::totals(&positions.iter().map(|(_, p)| *p).collect::<Vec<_>>());
        let _ = PortfolioLedger::validate(&all_trades, self.known_deposits_usd);

        Ok(PortfolioTotals {
            positions,
            realized_pnl: totals.realized_pnl,
            usd_invested: totals.usd_invested,
        })
    }

    async fn get_trades(&self, filters: TradeFilters) -> Result<Vec<crate::domain::trade::Trade>, StoreError> {
        self.trades
            .find_by_filters(
                filters.bot_id.as_deref(),
                filters.pair.as_deref(),
                filters.status,
                filters.since,
            )
            .await
    }
}
