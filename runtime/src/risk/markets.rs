//! Regional browser shares and the users a feature leaves behind per market.

use crate::catalog::{round2, FeatureRecord};
use serde::{Deserialize, Serialize};

/// Markets listed on an assessment.
pub const TOP_MARKETS: usize = 5;

/// Browser family share per market, in percent. The second field of each
/// family is the support-table key of its engine, if it has one.
const REGIONAL_SHARES: &[(&str, &[(Option<&str>, f64)])] = &[
    (
        "US",
        &[
            (Some("chrome"), 49.87),
            (Some("safari"), 35.24),
            (Some("edge"), 7.93),
            (Some("firefox"), 3.58),
            (Some("samsunginternet_android"), 1.25),
            (None, 2.13),
        ],
    ),
    (
        "India",
        &[
            (Some("chrome"), 78.54),
            (Some("safari"), 8.12),
            (Some("edge"), 4.23),
            (Some("firefox"), 2.01),
            (Some("samsunginternet_android"), 3.45),
            (None, 3.65),
        ],
    ),
    (
        "China",
        &[
            (Some("chrome"), 45.23),
            (Some("safari"), 15.67),
            (Some("edge"), 8.91),
            (None, 30.19),
        ],
    ),
    (
        "Germany",
        &[
            (Some("chrome"), 52.34),
            (Some("safari"), 23.12),
            (Some("edge"), 10.45),
            (Some("firefox"), 8.76),
            (Some("opera"), 2.34),
            (None, 2.99),
        ],
    ),
    (
        "Brazil",
        &[
            (Some("chrome"), 72.45),
            (Some("safari"), 15.34),
            (Some("edge"), 5.23),
            (Some("firefox"), 2.89),
            (Some("samsunginternet_android"), 2.12),
            (None, 1.97),
        ],
    ),
    (
        "Japan",
        &[
            (Some("chrome"), 51.02),
            (Some("safari"), 33.71),
            (Some("edge"), 9.12),
            (Some("firefox"), 3.05),
            (None, 3.10),
        ],
    ),
];

/// Estimated share of one market's users without the feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketImpact {
    pub market: String,
    /// Percent of the market's users, 0–100.
    pub affected_pct: f64,
}

/// Markets where the feature misses the most users, worst first.
///
/// A family whose engine is absent from a record with engine data counts as
/// fully unsupported. Other families lose the global support gap, covering
/// users on versions older than the minimum.
pub fn affected_markets(record: &FeatureRecord, top_n: usize) -> Vec<MarketImpact> {
    let gap = (100.0 - record.global_support.clamp(0.0, 100.0)) / 100.0;
    let mut impacts: Vec<MarketImpact> = REGIONAL_SHARES
        .iter()
        .map(|(market, families)| {
            let affected: f64 = families
                .iter()
                .map(|(engine, share)| {
                    let missing = match engine {
                        Some(engine) => {
                            !record.browsers.is_empty() && !record.browsers.contains_key(*engine)
                        }
                        None => false,
                    };
                    if missing {
                        *share
                    } else {
                        share * gap
                    }
                })
                .sum();
            MarketImpact {
                market: market.to_string(),
                affected_pct: round2(affected.clamp(0.0, 100.0)),
            }
        })
        .collect();
    impacts.sort_by(|a, b| {
        b.affected_pct
            .total_cmp(&a.affected_pct)
            .then_with(|| a.market.cmp(&b.market))
    });
    impacts.truncate(top_n);
    impacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BaselineStatus, FeatureKind};

    #[test]
    fn test_missing_engine_weighs_by_its_market_share() {
        let mut record =
            FeatureRecord::new("backdrop-filter", FeatureKind::Css, 80.0, BaselineStatus::Limited);
        for engine in ["chrome", "edge", "firefox", "samsunginternet_android", "opera"] {
            record.browsers.insert(engine.into(), "76".into());
        }

        let impacts = affected_markets(&record, TOP_MARKETS);
        assert_eq!(impacts.len(), TOP_MARKETS);
        // Safari-heavy markets suffer most when Safari lacks the feature
        assert_eq!(impacts[0].market, "US");
        assert!(impacts[0].affected_pct > 35.0);
        assert!(impacts.windows(2).all(|w| w[0].affected_pct >= w[1].affected_pct));
    }

    #[test]
    fn test_without_engine_data_every_market_loses_the_gap() {
        let record = FeatureRecord::new(":has()", FeatureKind::Css, 90.0, BaselineStatus::NewlyAvailable);
        let impacts = affected_markets(&record, 10);
        assert_eq!(impacts.len(), REGIONAL_SHARES.len());
        for impact in &impacts {
            assert!((impact.affected_pct - 10.0).abs() < 0.05, "{impact:?}");
        }
    }
}
