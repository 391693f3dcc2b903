//! Rolling-window move detectors over the reference tick buffer.
//!
//! All detectors are pure functions of a [`TickBuffer`]. "Now" is the
//! timestamp of the newest buffered tick, never the wall clock, so the same
//! tick sequence always yields the same answer.
//!
//! ## Detectors
//!
//! - **Spike**: `current - price_at(window)` reaches the minimum move.
//! - **Momentum**: a spike whose midpoint sample lies strictly between the
//!   start and current prices. V-shaped paths are rejected.
//! - **Volume / range**: confirmation filters over the same window.

use chrono::Duration;
use poly_common::Outcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::feed::TickBuffer;

/// Which move detector gates entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Spike,
    Momentum,
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorKind::Spike => write!(f, "spike"),
            DetectorKind::Momentum => write!(f, "momentum"),
        }
    }
}

/// A detected directional move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveSignal {
    pub kind: DetectorKind,
    /// `current - start`, signed.
    pub delta: Decimal,
    pub start_price: Decimal,
    pub current_price: Decimal,
}

impl MoveSignal {
    /// Outcome the move points at.
    pub fn side(&self) -> Outcome {
        if self.delta > Decimal::ZERO {
            Outcome::Up
        } else {
            Outcome::Down
        }
    }
}

/// Price of the first tick at or after `latest - ago`.
///
/// Falls back to the oldest tick when the buffer is shorter than `ago`.
/// Returns `None` only for an empty buffer.
pub fn price_at(buffer: &TickBuffer, ago: Duration) -> Option<Decimal> {
    let latest = buffer.latest()?;
    if ago <= Duration::zero() {
        return Some(latest.price);
    }

    let cutoff = latest.timestamp - ago;
    buffer
        .iter()
        .find(|t| t.timestamp >= cutoff)
        .map(|t| t.price)
}

/// Signed move over `window` if its magnitude reaches `min_move`.
pub fn detect_spike(buffer: &TickBuffer, min_move: Decimal, window: Duration) -> Option<Decimal> {
    let current = buffer.latest()?.price;
    let start = price_at(buffer, window)?;
    let delta = current - start;

    (!delta.is_zero() && delta.abs() >= min_move).then_some(delta)
}

/// Like [`detect_spike`], but the price at `window / 2` must lie strictly
/// between the start and current prices.
pub fn detect_momentum(
    buffer: &TickBuffer,
    min_move: Decimal,
    window: Duration,
) -> Option<Decimal> {
    let delta = detect_spike(buffer, min_move, window)?;
    let current = buffer.latest()?.price;
    let start = price_at(buffer, window)?;
    let mid = price_at(buffer, window / 2)?;

    let monotone = if delta > Decimal::ZERO {
        start < mid && mid < current
    } else {
        current < mid && mid < start
    };
    monotone.then_some(delta)
}

/// Run the chosen detector and package its result.
pub fn detect(
    kind: DetectorKind,
    buffer: &TickBuffer,
    min_move: Decimal,
    window: Duration,
) -> Option<MoveSignal> {
    let delta = match kind {
        DetectorKind::Spike => detect_spike(buffer, min_move, window)?,
        DetectorKind::Momentum => detect_momentum(buffer, min_move, window)?,
    };
    let current_price = buffer.latest()?.price;

    Some(MoveSignal {
        kind,
        delta,
        start_price: current_price - delta,
        current_price,
    })
}

/// Sum of traded quantity over the last `window`.
pub fn volume(buffer: &TickBuffer, window: Duration) -> Decimal {
    let Some(latest) = buffer.latest() else {
        return Decimal::ZERO;
    };
    buffer
        .since(latest.timestamp - window)
        .map(|t| t.quantity)
        .sum()
}

/// High minus low over the last `window`.
pub fn range(buffer: &TickBuffer, window: Duration) -> Option<Decimal> {
    let latest = buffer.latest()?;
    let mut ticks = buffer.since(latest.timestamp - window);
    let first = ticks.next()?.price;
    let (low, high) = ticks.fold((first, first), |(lo, hi), t| (lo.min(t.price), hi.max(t.price)));
    Some(high - low)
}

/// Why a detected move was not confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationFailure {
    /// Traded quantity below the minimum.
    LowVolume { volume: Decimal, min: Decimal },
    /// Price range below the minimum.
    FlatRange { range: Decimal, min: Decimal },
}

impl std::fmt::Display for ConfirmationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationFailure::LowVolume { volume, min } => {
                write!(f, "volume {} < {}", volume, min)
            }
            ConfirmationFailure::FlatRange { range, min } => {
                write!(f, "range ${} < ${}", range, min)
            }
        }
    }
}

/// Liquidity/flatness filters applied after a move fires. Zero disables a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Confirmation {
    pub min_volume: Decimal,
    pub min_range: Decimal,
}

impl Confirmation {
    pub fn check(&self, buffer: &TickBuffer, window: Duration) -> Result<(), ConfirmationFailure> {
        if self.min_volume > Decimal::ZERO {
            let v = volume(buffer, window);
            if v < self.min_volume {
                return Err(ConfirmationFailure::LowVolume {
                    volume: v,
                    min: self.min_volume,
                });
            }
        }
        if self.min_range > Decimal::ZERO {
            let r = range(buffer, window).unwrap_or(Decimal::ZERO);
            if r < self.min_range {
                return Err(ConfirmationFailure::FlatRange {
                    range: r,
                    min: self.min_range,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use poly_common::Tick;
    use rust_decimal_macros::dec;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Buffer with one tick every 500ms carrying the given prices.
    fn buffer_of(prices: &[Decimal]) -> TickBuffer {
        TickBuffer::from_ticks(
            1000,
            prices.iter().enumerate().map(|(i, p)| {
                Tick::new(base() + Duration::milliseconds(500 * i as i64), *p, dec!(0.5))
            }),
        )
    }

    #[test]
    fn test_price_at_zero_is_latest() {
        let buffer = buffer_of(&[dec!(1), dec!(2), dec!(3)]);
        assert_eq!(price_at(&buffer, Duration::zero()), Some(dec!(3)));

        // Several trades in the same millisecond: still the newest.
        let same_ms = TickBuffer::from_ticks(
            10,
            [dec!(10), dec!(11), dec!(12)]
                .into_iter()
                .map(|p| Tick::new(base(), p, dec!(1))),
        );
        assert_eq!(price_at(&same_ms, Duration::zero()), Some(dec!(12)));
    }

    #[test]
    fn test_price_at_short_buffer_returns_oldest() {
        let buffer = buffer_of(&[dec!(5), dec!(6)]);
        assert_eq!(price_at(&buffer, Duration::seconds(60)), Some(dec!(5)));
        assert_eq!(price_at(&TickBuffer::new(10), Duration::seconds(1)), None);
    }

    #[test]
    fn test_price_at_first_tick_at_or_after_cutoff() {
        // ticks at 0.0, 0.5, 1.0, 1.5, 2.0s
        let buffer = buffer_of(&[dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]);
        assert_eq!(price_at(&buffer, Duration::seconds(1)), Some(dec!(3)));
        assert_eq!(price_at(&buffer, Duration::milliseconds(700)), Some(dec!(4)));
    }

    #[test]
    fn test_detect_spike_both_directions() {
        let up = buffer_of(&[dec!(100000), dec!(100005), dec!(100016)]);
        assert_eq!(detect_spike(&up, dec!(15), Duration::seconds(1)), Some(dec!(16)));

        let down = buffer_of(&[dec!(100000), dec!(99990), dec!(99984)]);
        assert_eq!(detect_spike(&down, dec!(15), Duration::seconds(1)), Some(dec!(-16)));

        let small = buffer_of(&[dec!(100000), dec!(100014)]);
        assert_eq!(detect_spike(&small, dec!(15), Duration::seconds(1)), None);
    }

    #[test]
    fn test_detect_momentum_monotone_fires() {
        // 0s, 0.5s, 1s, 1.5s, 2s
        let buffer = buffer_of(&[
            dec!(100000),
            dec!(100004),
            dec!(100010),
            dec!(100015),
            dec!(100020),
        ]);
        assert_eq!(
            detect_momentum(&buffer, dec!(15), Duration::seconds(2)),
            Some(dec!(20))
        );
    }

    #[test]
    fn test_detect_momentum_rejects_v_shape() {
        // Dips below start at the midpoint, then rallies.
        let v_up = buffer_of(&[
            dec!(100000),
            dec!(99995),
            dec!(99990),
            dec!(100010),
            dec!(100020),
        ]);
        assert!(detect_spike(&v_up, dec!(15), Duration::seconds(2)).is_some());
        assert_eq!(detect_momentum(&v_up, dec!(15), Duration::seconds(2)), None);

        // Overshoots above current at the midpoint.
        let overshoot = buffer_of(&[
            dec!(100000),
            dec!(100010),
            dec!(100030),
            dec!(100025),
            dec!(100020),
        ]);
        assert_eq!(detect_momentum(&overshoot, dec!(15), Duration::seconds(2)), None);

        // Midpoint equal to start is not strictly between.
        let flat_mid = buffer_of(&[
            dec!(100000),
            dec!(100000),
            dec!(100000),
            dec!(100010),
            dec!(100020),
        ]);
        assert_eq!(detect_momentum(&flat_mid, dec!(15), Duration::seconds(2)), None);
    }

    #[test]
    fn test_detect_momentum_down() {
        let buffer = buffer_of(&[
            dec!(100000),
            dec!(99996),
            dec!(99990),
            dec!(99985),
            dec!(99980),
        ]);
        let signal = detect(DetectorKind::Momentum, &buffer, dec!(15), Duration::seconds(2)).unwrap();
        assert_eq!(signal.delta, dec!(-20));
        assert_eq!(signal.side(), Outcome::Down);
        assert_eq!(signal.start_price, dec!(100000));
    }

    #[test]
    fn test_volume_and_range() {
        let buffer = buffer_of(&[dec!(10), dec!(14), dec!(9), dec!(12)]);
        // last 1s: ticks at 0.5, 1.0, 1.5
        assert_eq!(volume(&buffer, Duration::seconds(1)), dec!(1.5));
        assert_eq!(range(&buffer, Duration::seconds(1)), Some(dec!(5)));
        assert_eq!(range(&TickBuffer::new(4), Duration::seconds(1)), None);
        assert_eq!(volume(&TickBuffer::new(4), Duration::seconds(1)), Decimal::ZERO);
    }

    #[test]
    fn test_confirmation_filters() {
        let buffer = buffer_of(&[dec!(10), dec!(14), dec!(9), dec!(12)]);
        let window = Duration::seconds(1);

        assert!(Confirmation::default().check(&buffer, window).is_ok());

        let volume_gate = Confirmation {
            min_volume: dec!(2),
            ..Default::default()
        };
        assert!(matches!(
            volume_gate.check(&buffer, window),
            Err(ConfirmationFailure::LowVolume { .. })
        ));

        let range_gate = Confirmation {
            min_range: dec!(6),
            ..Default::default()
        };
        assert!(matches!(
            range_gate.check(&buffer, window),
            Err(ConfirmationFailure::FlatRange { .. })
        ));
    }
}
