//! Gamma API client for market discovery.

use crate::types::{Instrument, MarketPair, OutcomeSide};
use crate::{Error, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::info;

/// Client for the Gamma markets API.
pub struct GammaClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl GammaClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://gamma-api.polymarket.com";

    /// Active markets scanned when the hourly slug is not listed.
    const FALLBACK_SCAN_LIMIT: u32 = 50;

    #[allow(clippy::result_large_err)]
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            http_client,
        })
    }

    /// Resolve the hourly Bitcoin up/down market for the given local time.
    pub async fn find_hourly_btc_market(&self, now: NaiveDateTime) -> Result<MarketPair> {
        let slug = hourly_btc_slug(now);
        info!(slug = %slug, "Searching for market");

        let url = format!("{}/markets?slug={}", self.base_url, slug);
        let by_slug = self.fetch_markets(&url).await?;
        if let Some(market) = by_slug.into_iter().next() {
            return market.into_pair();
        }

        info!("Market not found by slug, searching active markets");
        let url = format!(
            "{}/markets?active=true&limit={}&closed=false",
            self.base_url,
            Self::FALLBACK_SCAN_LIMIT
        );
        self.fetch_markets(&url)
            .await?
            .into_iter()
            .find(GammaMarket::is_btc_up_down)
            .ok_or_else(|| Error::InvalidMarket("No active Bitcoin market found".to_string()))?
            .into_pair()
    }

    async fn fetch_markets(&self, url: &str) -> Result<Vec<GammaMarket>> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api {
                message: format!("Gamma request failed: {}", response.status()),
                status: Some(response.status().as_u16()),
            });
        }
        let markets: GammaMarkets = response.json().await?;
        Ok(markets.into_vec())
    }
}

/// Slug of the hourly market, e.g. `bitcoin-up-or-down-october-19-3pm-et`.
pub fn hourly_btc_slug(now: NaiveDateTime) -> String {
    let month = now.format("%B").to_string().to_lowercase();
    let hour = match now.hour() {
        0 => "12am".to_string(),
        h @ 1..=11 => format!("{}am", h),
        12 => "12pm".to_string(),
        h => format!("{}pm", h - 12),
    };
    format!("bitcoin-up-or-down-{}-{}-{}-et", month, now.day(), hour)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GammaMarkets {
    List(Vec<GammaMarket>),
    Wrapped { data: Vec<GammaMarket> },
}

impl GammaMarkets {
    fn into_vec(self) -> Vec<GammaMarket> {
        match self {
            GammaMarkets::List(markets) => markets,
            GammaMarkets::Wrapped { data } => data,
        }
    }
}

/// Gamma encodes list fields either as arrays or as JSON strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringList {
    List(Vec<String>),
    Encoded(String),
}

impl StringList {
    #[allow(clippy::result_large_err)]
    fn into_vec(self) -> Result<Vec<String>> {
        match self {
            StringList::List(items) => Ok(items),
            StringList::Encoded(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    #[serde(rename = "conditionId", default)]
    condition_id: String,
    #[serde(default)]
    question: String,
    #[serde(rename = "clobTokenIds")]
    clob_token_ids: Option<StringList>,
    outcomes: Option<StringList>,
}

impl GammaMarket {
    fn is_btc_up_down(&self) -> bool {
        let q = self.question.to_lowercase();
        (q.contains("bitcoin") || q.contains("btc")) && q.contains("up") && q.contains("down")
    }

    #[allow(clippy::result_large_err)]
    fn into_pair(self) -> Result<MarketPair> {
        let token_ids = match self.clob_token_ids {
            Some(ids) => ids.into_vec()?,
            None => Vec::new(),
        };
        let outcomes = match self.outcomes {
            Some(outcomes) => outcomes.into_vec()?,
            None => Vec::new(),
        };

        if token_ids.len() < 2 {
            return Err(Error::InvalidMarket(format!(
                "Market '{}' must have at least 2 tokens",
                self.question
            )));
        }

        let find = |needles: [&str; 2]| {
            outcomes.iter().position(|o| {
                let o = o.to_lowercase();
                needles.iter().any(|n| o.contains(n))
            })
        };
        let up_index = find(["up", "yes"]).unwrap_or(0);
        let down_index = find(["down", "no"]).unwrap_or(1);

        let token = |index: usize| {
            token_ids.get(index).cloned().ok_or_else(|| {
                Error::InvalidMarket(format!("Outcome index {} has no token id", index))
            })
        };

        let pair = MarketPair {
            condition_id: self.condition_id,
            question: self.question,
            up: Instrument {
                token_id: token(up_index)?,
                side: OutcomeSide::Up,
            },
            down: Instrument {
                token_id: token(down_index)?,
                side: OutcomeSide::Down,
            },
        };
        info!(
            question = %pair.question,
            up = %pair.up.token_id,
            down = %pair.down.token_id,
            "Market found"
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(hour, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_hourly_slug() {
        assert_eq!(hourly_btc_slug(at(0)), "bitcoin-up-or-down-october-19-12am-et");
        assert_eq!(hourly_btc_slug(at(9)), "bitcoin-up-or-down-october-19-9am-et");
        assert_eq!(hourly_btc_slug(at(12)), "bitcoin-up-or-down-october-19-12pm-et");
        assert_eq!(hourly_btc_slug(at(15)), "bitcoin-up-or-down-october-19-3pm-et");
    }

    #[test]
    fn test_encoded_token_lists() {
        let markets: GammaMarkets = serde_json::from_str(
            r#"[{"conditionId":"0xc","question":"Bitcoin Up or Down - 3PM ET",
                "clobTokenIds":"[\"111\",\"222\"]","outcomes":"[\"Up\",\"Down\"]"}]"#,
        )
        .unwrap();
        let pair = markets.into_vec().remove(0).into_pair().unwrap();
        assert_eq!(pair.up.token_id, "111");
        assert_eq!(pair.down.token_id, "222");
        assert_eq!(pair.condition_id, "0xc");
    }

    #[test]
    fn test_wrapped_array_and_reversed_outcomes() {
        let markets: GammaMarkets = serde_json::from_str(
            r#"{"data":[{"question":"BTC up or down?",
                "clobTokenIds":["111","222"],"outcomes":["Down","Up"]}]}"#,
        )
        .unwrap();
        let pair = markets.into_vec().remove(0).into_pair().unwrap();
        assert_eq!(pair.up.token_id, "222");
        assert_eq!(pair.down.token_id, "111");
    }

    #[test]
    fn test_single_token_rejected() {
        let markets: GammaMarkets = serde_json::from_str(
            r#"[{"question":"Bitcoin up or down","clobTokenIds":["111"],"outcomes":["Up"]}]"#,
        )
        .unwrap();
        let result = markets.into_vec().remove(0).into_pair();
        assert!(matches!(result, Err(Error::InvalidMarket(_))));
    }

    #[test]
    fn test_btc_question_filter() {
        let market = |question: &str| GammaMarket {
            condition_id: String::new(),
            question: question.to_string(),
            clob_token_ids: None,
            outcomes: None,
        };
        assert!(market("Bitcoin Up or Down - October 19, 3PM ET").is_btc_up_down());
        assert!(!market("Ethereum Up or Down").is_btc_up_down());
        assert!(!market("Will BTC hit 100k?").is_btc_up_down());
    }
}
