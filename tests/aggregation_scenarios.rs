use confluence::application::market_data::snapshot::MultiTimeframeSnapshot;
use confluence::application::market_data::timeframe_manager::TimeframeManager;
use confluence::application::signals::aggregator::SignalAggregator;
use confluence::config::{IndicatorConfig, SignalConfig, TimeframeSettings, default_indicators};
use confluence::domain::market::candle::Candle;
use confluence::domain::market::timeframe::Timeframe;
use confluence::domain::trading::signal::Direction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

const TAKEN_AT: i64 = 1_700_000_000_000;

/// Trend of `len` candles moving one unit per bar.
fn trend(timeframe: Timeframe, len: usize, rising: bool) -> Vec<Candle> {
    let step = timeframe.to_seconds() * 1000;
    (0..len)
        .map(|i| {
            let i = i as i64;
            let (open, close) = if rising {
                (Decimal::from(99 + i), Decimal::from(100 + i))
            } else {
                (Decimal::from(301 - i), Decimal::from(300 - i))
            };
            Candle::new(
                i * step,
                open,
                open.max(close) + dec!(0.5),
                open.min(close) - dec!(0.5),
                close,
                dec!(10),
            )
        })
        .collect()
}

fn snapshot(len: usize, rising: bool) -> MultiTimeframeSnapshot {
    let series: BTreeMap<_, _> = Timeframe::ALL
        .iter()
        .map(|&tf| (tf, trend(tf, len, rising)))
        .collect();
    MultiTimeframeSnapshot::new(series, TAKEN_AT)
}

fn config_with(indicators: Vec<IndicatorConfig>) -> SignalConfig {
    SignalConfig {
        symbol: "TESTUSD".to_string(),
        indicators,
        ..SignalConfig::default()
    }
}

fn ema_only() -> SignalConfig {
    config_with(vec![IndicatorConfig::new(
        "EMA_Cross",
        &[("fast", 5.0), ("slow", 20.0)],
    )])
}

#[test]
fn test_uptrend_with_trend_follower_is_buy() {
    let aggregator = SignalAggregator::from_config(&ema_only()).unwrap();
    let signal = aggregator.generate_signal(&snapshot(120, true)).unwrap();

    assert_eq!(signal.direction, Direction::Buy);
    assert!(signal.is_actionable());
    assert!(signal.consensus);
    // Unanimous vote is treated as degenerate and dampened
    assert!((signal.bias - 30.0).abs() < 1e-9);
    assert_eq!(signal.timestamp, TAKEN_AT);

    let price = dec!(219);
    let target = signal.target_price.unwrap();
    let stop = signal.stop_price.unwrap();
    assert!(target > price && stop < price);
    assert!(signal.reasoning.starts_with("BUY"));
}

#[test]
fn test_downtrend_with_trend_follower_is_sell() {
    let aggregator = SignalAggregator::from_config(&ema_only()).unwrap();
    let signal = aggregator.generate_signal(&snapshot(120, false)).unwrap();

    assert_eq!(signal.direction, Direction::Sell);
    assert!((signal.bias + 30.0).abs() < 1e-9);

    let price = dec!(181);
    assert!(signal.target_price.unwrap() < price);
    assert!(signal.stop_price.unwrap() > price);
}

#[test]
fn test_short_history_holds_with_floor_confidence() {
    let config = config_with(default_indicators());
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let signal = aggregator.generate_signal(&snapshot(10, true)).unwrap();

    assert_eq!(signal.direction, Direction::Hold);
    assert!(!signal.is_actionable());
    assert_eq!(signal.confidence, config.aggregation.empty_confidence);
    assert!(signal.indicators.is_empty());
    assert!(signal.target_price.is_none() && signal.stop_price.is_none());
}

#[test]
fn test_full_indicator_set_is_well_formed_and_deterministic() {
    let config = config_with(default_indicators());
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let snap = snapshot(200, true);

    let first = aggregator.generate_signal(&snap).unwrap();
    let second = aggregator.generate_signal(&snap).unwrap();
    assert_eq!(first, second);

    assert!((0.0..=1.0).contains(&first.confidence));
    assert!((-100.0..=100.0).contains(&first.bias));
    assert_eq!(first.indicators.len(), 7);
    assert!(first.indicators.iter().all(|s| s.timeframe == Timeframe::OneMin));
    assert!(first.indicators.iter().all(|s| (0.0..=1.0).contains(&s.strength)));

    match first.direction {
        Direction::Hold => assert!(first.target_price.is_none()),
        _ => assert!(first.target_price.is_some() && first.stop_price.is_some()),
    }
}

#[test]
fn test_coarsest_trading_timeframe_has_no_consensus() {
    let config = SignalConfig {
        trading_timeframe: Timeframe::FourHour,
        ..ema_only()
    };
    let aggregator = SignalAggregator::from_config(&config).unwrap();
    let signal = aggregator.generate_signal(&snapshot(120, true)).unwrap();

    assert_eq!(signal.direction, Direction::Buy);
    assert!(!signal.consensus);
    assert!(signal.indicators.iter().all(|s| s.timeframe == Timeframe::FourHour));
}

#[tokio::test]
async fn test_manager_snapshot_feeds_aggregator() {
    let settings = Timeframe::ALL
        .iter()
        .map(|&tf| {
            (
                tf,
                TimeframeSettings {
                    min_candles: 60,
                    snapshot_depth: 100,
                    ..TimeframeSettings::defaults_for(tf)
                },
            )
        })
        .collect();
    let manager = TimeframeManager::new(settings);
    for tf in Timeframe::ALL {
        assert_eq!(manager.extend(tf, trend(tf, 150, true)).await, 150);
    }
    assert!(manager.is_ready().await);

    let snap = manager.snapshot().await;
    assert_eq!(snap.len(Timeframe::OneMin), 100);

    let aggregator = SignalAggregator::from_config(&ema_only()).unwrap();
    let signal = aggregator.generate_signal(&snap).unwrap();
    assert_eq!(signal.direction, Direction::Buy);
    assert_eq!(signal.timestamp, snap.taken_at());
}
