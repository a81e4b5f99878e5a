use super::weighting::{self, BiasBreakdown};
use crate::application::indicators::{Indicator, PriceLevels, build_indicators};
use crate::application::market_data::snapshot::MultiTimeframeSnapshot;
use crate::config::{AggregationConfig, SignalConfig, TierTable};
use crate::domain::errors::SignalError;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::signal::{Direction, IndicatorSignal, SignalStamp, TradingSignal};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::sync::Arc;
use tracing::debug;

/// Turns a multi-timeframe snapshot into one trading decision.
///
/// Stateless between calls: every pass recomputes indicators from the
/// snapshot, so the aggregator can be shared freely across tasks.
pub struct SignalAggregator {
    symbol: String,
    trading_timeframe: Timeframe,
    config: AggregationConfig,
    tiers: TierTable,
    indicators: Vec<Arc<dyn Indicator>>,
}

/// Outcome of the coarser-timeframe agreement check.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Consensus {
    Agrees(f64),
    Disagrees(f64),
    Unavailable,
}

impl SignalAggregator {
    pub fn new(
        symbol: impl Into<String>,
        trading_timeframe: Timeframe,
        config: AggregationConfig,
        tiers: TierTable,
        indicators: Vec<Arc<dyn Indicator>>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            trading_timeframe,
            config,
            tiers,
            indicators,
        }
    }

    /// Validates the configuration and builds the enabled indicators.
    pub fn from_config(config: &SignalConfig) -> Result<Self, SignalError> {
        config.validate()?;
        let indicators = build_indicators(&config.indicators)?;
        Ok(Self::new(
            config.symbol.clone(),
            config.trading_timeframe,
            config.aggregation.clone(),
            config.tiers.clone(),
            indicators,
        ))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn trading_timeframe(&self) -> Timeframe {
        self.trading_timeframe
    }

    pub fn indicator_names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    /// Generates a signal priced at the last close of the trading timeframe.
    pub fn generate_signal(
        &self,
        snapshot: &MultiTimeframeSnapshot,
    ) -> Result<TradingSignal, SignalError> {
        let price = snapshot
            .last_close(self.trading_timeframe)
            .ok_or(SignalError::InvalidContext {
                timeframe: self.trading_timeframe,
            })?;
        self.generate_signal_at(snapshot, price)
    }

    pub fn generate_signal_at(
        &self,
        snapshot: &MultiTimeframeSnapshot,
        current_price: Decimal,
    ) -> Result<TradingSignal, SignalError> {
        let tf = self.trading_timeframe;
        let candles = snapshot.candles(tf);
        let Some(last) = candles.last() else {
            return Err(SignalError::InvalidContext { timeframe: tf });
        };
        let timestamp = if snapshot.taken_at() > 0 {
            snapshot.taken_at()
        } else {
            last.timestamp
        };
        let price = current_price.to_f64().unwrap_or_else(|| last.close_f64());

        let signals = self.evaluate(tf, candles, price, tf.is_finest(), false);
        if signals.is_empty() {
            debug!(
                "SignalAggregator[{}]: no indicator computable on {} ({} candles)",
                self.symbol,
                tf,
                candles.len()
            );
            return Ok(TradingSignal {
                symbol: self.symbol.clone(),
                direction: Direction::Hold,
                confidence: self.config.empty_confidence,
                bias: 0.0,
                consensus: false,
                reasoning: format!(
                    "HOLD: no indicator has enough {} history ({} candles)",
                    tf,
                    candles.len()
                ),
                indicators: Vec::new(),
                target_price: None,
                stop_price: None,
                timestamp,
            });
        }

        let breakdown = BiasBreakdown::from_signals(&signals, &self.tiers);
        let raw_bias = breakdown.bias();
        let mut bias = weighting::dampen_extreme(raw_bias, &self.config);

        let consensus = self.consensus(snapshot, price, bias);
        if let Consensus::Disagrees(_) = consensus {
            bias *= self.config.consensus_penalty;
        }
        let consensus_held = matches!(consensus, Consensus::Agrees(_));

        let mut direction = weighting::direction_for(bias, &self.config);
        let confidence =
            weighting::confidence(bias, consensus_held, breakdown.hold_share(), &self.config);

        let mut reasoning = describe(&breakdown, tf, raw_bias, bias, consensus);
        if direction != Direction::Hold && confidence < self.config.min_confidence {
            reasoning.push_str(&format!(
                "; {} downgraded: confidence {:.2} below minimum {:.2}",
                direction, confidence, self.config.min_confidence
            ));
            direction = Direction::Hold;
        }

        let (target_price, stop_price) = match direction {
            Direction::Hold => (None, None),
            _ => self.target_and_stop(snapshot, direction, current_price, price),
        };

        let signal = TradingSignal {
            symbol: self.symbol.clone(),
            direction,
            confidence,
            bias,
            consensus: consensus_held,
            reasoning: format!("{}: {}", direction, reasoning),
            indicators: signals,
            target_price,
            stop_price,
            timestamp,
        };
        debug!("SignalAggregator: {}", signal);
        Ok(signal)
    }

    /// Runs every indicator with enough history on `candles`.
    fn evaluate(
        &self,
        timeframe: Timeframe,
        candles: &[Candle],
        price: f64,
        refined: bool,
        skip_excluded: bool,
    ) -> Vec<IndicatorSignal> {
        let Some(last) = candles.last() else {
            return Vec::new();
        };
        let stamp = SignalStamp {
            timeframe,
            timestamp: last.timestamp,
        };

        self.indicators
            .iter()
            .filter(|indicator| {
                !skip_excluded
                    || !self
                        .config
                        .consensus_excluded
                        .iter()
                        .any(|name| name == indicator.name())
            })
            .filter_map(|indicator| {
                let values = indicator.calculate(candles);
                if values.is_empty() {
                    return None;
                }
                let signal = match indicator.as_refined() {
                    Some(refined_signal) if refined => {
                        refined_signal.refined_signal(&values, price, stamp)
                    }
                    _ => indicator.signal(&values, price, stamp),
                };
                Some(signal)
            })
            .collect()
    }

    fn consensus(&self, snapshot: &MultiTimeframeSnapshot, price: f64, bias: f64) -> Consensus {
        let Some(coarser) = self.trading_timeframe.next_coarser() else {
            return Consensus::Unavailable;
        };
        let signals = self.evaluate(coarser, snapshot.candles(coarser), price, false, true);
        let coarser_bias = BiasBreakdown::from_signals(&signals, &self.tiers).bias();

        if coarser_bias == 0.0 || bias == 0.0 {
            Consensus::Unavailable
        } else if coarser_bias.signum() == bias.signum() {
            Consensus::Agrees(coarser_bias)
        } else {
            Consensus::Disagrees(coarser_bias)
        }
    }

    fn levels(&self, snapshot: &MultiTimeframeSnapshot) -> PriceLevels {
        let Some(coarser) = self.trading_timeframe.next_coarser() else {
            return PriceLevels::default();
        };
        let candles = snapshot.candles(coarser);
        let mut levels = PriceLevels::default();
        for provider in self.indicators.iter().filter_map(|i| i.as_level_provider()) {
            let found = provider.levels(candles);
            levels.supports.extend(found.supports);
            levels.resistances.extend(found.resistances);
        }
        levels
    }

    fn target_and_stop(
        &self,
        snapshot: &MultiTimeframeSnapshot,
        direction: Direction,
        current_price: Decimal,
        price: f64,
    ) -> (Option<Decimal>, Option<Decimal>) {
        let levels = self.levels(snapshot);
        if levels.is_empty() {
            debug!(
                "SignalAggregator[{}]: no coarser-timeframe levels, using fixed offsets",
                self.symbol
            );
        }
        let support = levels.nearest_support_below(price).and_then(Decimal::from_f64);
        let resistance = levels.nearest_resistance_above(price).and_then(Decimal::from_f64);

        let offset = |pct: f64, up: bool| {
            Decimal::from_f64(pct).map(|pct| {
                let factor = if up { Decimal::ONE + pct } else { Decimal::ONE - pct };
                current_price * factor
            })
        };

        match direction {
            Direction::Buy => (
                resistance.or_else(|| offset(self.config.target_pct, true)),
                support.or_else(|| offset(self.config.stop_pct, false)),
            ),
            Direction::Sell => (
                support.or_else(|| offset(self.config.target_pct, false)),
                resistance.or_else(|| offset(self.config.stop_pct, true)),
            ),
            Direction::Hold => (None, None),
        }
    }
}

fn describe(
    breakdown: &BiasBreakdown,
    timeframe: Timeframe,
    raw_bias: f64,
    bias: f64,
    consensus: Consensus,
) -> String {
    let mut text = format!(
        "bias {:+.1} from {} buy / {} sell / {} hold on {} (avg strength {:.2})",
        bias,
        breakdown.buy_count,
        breakdown.sell_count,
        breakdown.hold_count,
        timeframe,
        breakdown.average_strength()
    );
    if let Some(coarser) = timeframe.next_coarser() {
        match consensus {
            Consensus::Agrees(b) => text.push_str(&format!("; {} agrees ({:+.1})", coarser, b)),
            Consensus::Disagrees(b) => {
                text.push_str(&format!("; {} disagrees ({:+.1}), bias penalized", coarser, b))
            }
            Consensus::Unavailable => text.push_str(&format!("; no {} consensus", coarser)),
        }
    }
    if (raw_bias - bias).abs() > f64::EPSILON && raw_bias.abs() > 0.0 {
        text.push_str(&format!("; raw bias {:+.1}", raw_bias));
    }
    text
}

impl std::fmt::Debug for SignalAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalAggregator")
            .field("symbol", &self.symbol)
            .field("trading_timeframe", &self.trading_timeframe)
            .field("indicators", &self.indicator_names())
            .finish()
    }
}
