//! Market assessment helpers shared by every strategy

use super::StrategyKind;
use crate::marketplace::Listing;
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum valid bid increment for a current price (eBay-style table)
pub fn min_bid_increment(price: Money) -> Money {
    let cents = match price.cents() {
        0..=99 => 5,
        100..=499 => 25,
        500..=2_499 => 50,
        2_500..=9_999 => 100,
        10_000..=24_999 => 250,
        25_000..=49_999 => 500,
        50_000..=99_999 => 1_000,
        100_000..=249_999 => 2_500,
        250_000..=499_999 => 5_000,
        _ => 10_000,
    };
    Money::from_cents(cents)
}

/// Lowest bid the marketplace will take on `listing`
pub fn min_valid_bid(listing: &Listing) -> Money {
    if listing.bid_count == 0 {
        listing.current_price
    } else {
        listing.current_price + min_bid_increment(listing.current_price)
    }
}

/// Rough fair-value estimate for a listing
///
/// A buy-it-now price on an auction anchors the value. Otherwise the current
/// price is marked up by demand: 3% per bid (up to 10 bids) and 1% per
/// watcher (up to 20 watchers).
pub fn fair_value(listing: &Listing) -> Money {
    if let (true, Some(bin)) = (listing.is_auction, listing.buy_it_now_price) {
        return bin;
    }
    let demand = 0.03 * f64::from(listing.bid_count.min(10))
        + 0.01 * f64::from(listing.watcher_count.min(20));
    listing.current_price.scale(1.0 + demand)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketCondition {
    Underpriced,
    Fair,
    Overpriced,
}

impl MarketCondition {
    /// Compare a price against fair value with a ±10% band
    pub fn assess(price: Money, fair: Money) -> Self {
        let fair = fair.as_dollars();
        let price = price.as_dollars();
        if price < fair * 0.9 {
            Self::Underpriced
        } else if price > fair * 1.1 {
            Self::Overpriced
        } else {
            Self::Fair
        }
    }

    pub fn for_listing(listing: &Listing) -> Self {
        Self::assess(listing.current_price, fair_value(listing))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
}

impl CompetitionLevel {
    /// Competition from visible demand on a listing
    pub fn assess(listing: &Listing) -> Self {
        if listing.bid_count >= 8 || listing.watcher_count >= 30 {
            Self::High
        } else if listing.bid_count >= 3 || listing.watcher_count >= 10 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConcentrationLevel {
    Low,
    Moderate,
    High,
}

/// Herfindahl-Hirschman index over strategy shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationRisk {
    /// Sum of squared shares, in (0, 1]
    pub hhi: f64,
    pub level: ConcentrationLevel,
    /// Strategy with the largest share
    pub dominant: Option<StrategyKind>,
    pub shares: BTreeMap<StrategyKind, f64>,
}

impl ConcentrationRisk {
    /// Compute from a strategy → agent count distribution
    pub fn from_distribution(distribution: &BTreeMap<StrategyKind, usize>) -> Self {
        let total: usize = distribution.values().sum();
        if total == 0 {
            return Self {
                hhi: 0.0,
                level: ConcentrationLevel::Low,
                dominant: None,
                shares: BTreeMap::new(),
            };
        }

        let shares: BTreeMap<StrategyKind, f64> = distribution
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| (*kind, *count as f64 / total as f64))
            .collect();
        let hhi: f64 = shares.values().map(|s| s * s).sum();
        let dominant = shares
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(kind, _)| *kind);

        let level = if hhi < 0.3 {
            ConcentrationLevel::Low
        } else if hhi < 0.5 {
            ConcentrationLevel::Moderate
        } else {
            ConcentrationLevel::High
        };

        Self {
            hhi,
            level,
            dominant,
            shares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_table() {
        assert_eq!(min_bid_increment(Money::from_cents(50)), Money::from_cents(5));
        assert_eq!(min_bid_increment(Money::from_dollars(4.99)), Money::from_cents(25));
        assert_eq!(min_bid_increment(Money::from_dollars(24.99)), Money::from_cents(50));
        assert_eq!(min_bid_increment(Money::from_dollars(80.0)), Money::from_dollars(1.0));
        assert_eq!(min_bid_increment(Money::from_dollars(100.0)), Money::from_dollars(2.5));
        assert_eq!(min_bid_increment(Money::from_dollars(6000.0)), Money::from_dollars(100.0));
    }

    #[test]
    fn test_min_valid_bid() {
        let fresh = Listing::new("l", "x", Money::from_dollars(40.0));
        assert_eq!(min_valid_bid(&fresh), Money::from_dollars(40.0));
        let contested = fresh.with_activity(2, 0);
        assert_eq!(min_valid_bid(&contested), Money::from_dollars(41.0));
    }

    #[test]
    fn test_fair_value_and_condition() {
        let listing = Listing::new("l", "x", Money::from_dollars(100.0)).with_activity(10, 20);
        assert_eq!(fair_value(&listing), Money::from_dollars(150.0));
        assert_eq!(MarketCondition::for_listing(&listing), MarketCondition::Underpriced);

        let quiet = Listing::new("l", "x", Money::from_dollars(100.0));
        assert_eq!(MarketCondition::for_listing(&quiet), MarketCondition::Fair);
        assert_eq!(
            MarketCondition::assess(Money::from_dollars(120.0), Money::from_dollars(100.0)),
            MarketCondition::Overpriced
        );
    }

    #[test]
    fn test_competition_levels() {
        let base = Listing::new("l", "x", Money::from_dollars(10.0));
        assert_eq!(CompetitionLevel::assess(&base), CompetitionLevel::Low);
        assert_eq!(
            CompetitionLevel::assess(&base.clone().with_activity(3, 0)),
            CompetitionLevel::Medium
        );
        assert_eq!(
            CompetitionLevel::assess(&base.with_activity(0, 45)),
            CompetitionLevel::High
        );
    }

    #[test]
    fn test_concentration_risk_levels() {
        let balanced: BTreeMap<StrategyKind, usize> = StrategyKind::ALL.iter().map(|k| (*k, 1)).collect();
        let risk = ConcentrationRisk::from_distribution(&balanced);
        assert!((risk.hhi - 0.2).abs() < 1e-9);
        assert_eq!(risk.level, ConcentrationLevel::Low);

        let mixed = BTreeMap::from([(StrategyKind::Sniper, 3), (StrategyKind::Passive, 2)]);
        let risk = ConcentrationRisk::from_distribution(&mixed);
        assert!((risk.hhi - 0.52).abs() < 1e-9);
        assert_eq!(risk.level, ConcentrationLevel::High);
        assert_eq!(risk.dominant, Some(StrategyKind::Sniper));

        let mono = BTreeMap::from([(StrategyKind::Hybrid, 4)]);
        assert_eq!(ConcentrationRisk::from_distribution(&mono).hhi, 1.0);

        let moderate = BTreeMap::from([
            (StrategyKind::Sniper, 3),
            (StrategyKind::Passive, 2),
            (StrategyKind::Hybrid, 1),
        ]);
        // (9 + 4 + 1) / 36
        assert_eq!(
            ConcentrationRisk::from_distribution(&moderate).level,
            ConcentrationLevel::Moderate
        );
    }
}
