//! Changing a bot's strategy (weights/thresholds) must atomically clear any
//! in-flight confirmation, so a confirmation started under the old
//! configuration can never be promoted under the new one. Changing only
//! `position_size_usd`/`cooldown_seconds` must leave confirmation alone.

mod common;

use chrono::Utc;

use tradeforge_engine::domain::confirmation::ConfirmationState;
use tradeforge_engine::domain::signal::Action;

#[tokio::test]
async fn strategy_change_resets_confirmation_in_the_store() {
    let (bots, _trades) = common::fresh_repos().await;
    let mut bot = common::sample_bot("b1", "BTC-USD");
    bots.create(&bot).await.unwrap();

    // Simulate an in-flight confirmation, as the evaluator would persist it.
    bot.confirmation_start_at = Some(Utc::now());
    bot.last_action_being_confirmed = Some(Action::Buy.as_str().to_string());
    bots.update_evaluation_state(&bot).await.unwrap();

    let reloaded = bots.get("b1").await.unwrap();
    assert!(matches!(
        reloaded.confirmation_state(),
        ConfirmationState::Confirming { action: Action::Buy, .. }
    ));

    // Flip the strategy's buy threshold and persist through the
    // confirmation-resetting path.
    let mut changed = reloaded.clone();
    changed.buy_threshold = dec_neg_quarter();
    changed.reset_confirmation();
    bots.update_config_and_reset_confirmation(&changed).await.unwrap();

    let after = bots.get("b1").await.unwrap();
    assert_eq!(after.confirmation_state(), ConfirmationState::Idle);
    assert_eq!(after.buy_threshold, dec_neg_quarter());
}

#[tokio::test]
async fn sizing_only_change_does_not_touch_confirmation() {
    let (bots, _trades) = common::fresh_repos().await;
    let mut bot = common::sample_bot("b1", "BTC-USD");
    bots.create(&bot).await.unwrap();

    bot.confirmation_start_at = Some(Utc::now());
    bot.last_action_being_confirmed = Some(Action::Sell.as_str().to_string());
    bots.update_evaluation_state(&bot).await.unwrap();

    let mut resized = bots.get("b1").await.unwrap();
    resized.position_size_usd = common::tiny_position_size() * rust_decimal_macros::dec!(2);
    // A plain config update (no strategy change) must preserve the
    // in-flight confirmation fields.
    bots.update(&resized).await.unwrap();

    let after = bots.get("b1").await.unwrap();
    assert!(matches!(
        after.confirmation_state(),
        ConfirmationState::Confirming { action: Action::Sell, .. }
    ));
    assert_eq!(after.position_size_usd, common::tiny_position_size() * rust_decimal_macros::dec!(2));
}

fn dec_neg_quarter() -> rust_decimal::Decimal {
    rust_decimal_macros::dec!(-0.25)
}
