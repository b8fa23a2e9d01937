//! Seasonal stay pricing — the illustrative hospitality tool.
//!
//! Seasons follow the southern-hemisphere hotel calendar: high season
//! is summer (Dec–Feb) plus the July holiday break, shoulder wraps the
//! edges, everything else is low.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nx_domain::error::{Error, Result};

use crate::runtime::registry::{ExecutableTool, RiskLevel, ToolContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Season calendar
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    High,
    Shoulder,
    Low,
}

/// Season for a calendar date.
pub fn season_for_date(date: NaiveDate) -> Season {
    match date.month() {
        12 | 1 | 2 | 7 => Season::High,
        3 | 6 | 8 | 11 => Season::Shoulder,
        _ => Season::Low,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Price calculation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct RateCard {
    pub room_type_id: String,
    pub season: Season,
    pub price_per_night: f64,
    #[serde(default)]
    pub min_stay: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StayQuote {
    pub nights: i64,
    pub total: f64,
    pub meets_min_stay: bool,
    pub season: Season,
}

/// Quote a stay: the check-in date picks the season, the matching rate
/// card prices every night.
pub fn calculate_stay_price(
    rates: &[RateCard],
    room_type_id: &str,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> std::result::Result<StayQuote, String> {
    let nights = (check_out - check_in).num_days();
    if nights <= 0 {
        return Err("check_out must be after check_in".into());
    }

    let season = season_for_date(check_in);
    let rate = rates
        .iter()
        .find(|r| r.room_type_id == room_type_id && r.season == season)
        .ok_or_else(|| {
            format!("no rate for room type '{room_type_id}' in {season:?} season")
        })?;

    Ok(StayQuote {
        nights,
        total: nights as f64 * rate.price_per_night,
        meets_min_stay: nights >= rate.min_stay as i64,
        season,
    })
}

fn parse_date(input: &Value, field: &str) -> std::result::Result<NaiveDate, String> {
    let raw = input[field]
        .as_str()
        .ok_or_else(|| format!("{field} must be a YYYY-MM-DD string"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("{field} is not a valid date: {raw}"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StayPricingTool;

#[async_trait]
impl ExecutableTool for StayPricingTool {
    fn id(&self) -> &str {
        "stay_pricing"
    }
    fn name(&self) -> &str {
        "Stay Pricing"
    }
    fn description(&self) -> &str {
        "Quote a hotel stay: nights, seasonal rate, total, and minimum-stay check."
    }
    fn category(&self) -> &str {
        "hospitality"
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    fn supports_dry_run(&self) -> bool {
        true
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "rates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "room_type_id": { "type": "string" },
                            "season": { "type": "string", "enum": ["high", "shoulder", "low"] },
                            "price_per_night": { "type": "number" },
                            "min_stay": { "type": "integer" }
                        },
                        "required": ["room_type_id", "season", "price_per_night"]
                    }
                },
                "room_type_id": { "type": "string" },
                "check_in": { "type": "string", "description": "YYYY-MM-DD" },
                "check_out": { "type": "string", "description": "YYYY-MM-DD" }
            },
            "required": ["rates", "room_type_id", "check_in", "check_out"]
        })
    }
    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nights": { "type": "integer" },
                "total": { "type": "number" },
                "meets_min_stay": { "type": "boolean" },
                "season": { "type": "string" }
            }
        })
    }

    async fn execute(&self, input: &Value, _ctx: &ToolContext) -> Result<Value> {
        let fail = |message: String| Error::ToolExecution {
            tool_id: "stay_pricing".into(),
            message,
        };

        let rates: Vec<RateCard> =
            serde_json::from_value(input["rates"].clone()).map_err(|e| fail(e.to_string()))?;
        let room_type_id = input["room_type_id"].as_str().unwrap_or_default();
        let check_in = parse_date(input, "check_in").map_err(fail)?;
        let check_out = parse_date(input, "check_out").map_err(fail)?;

        let quote = calculate_stay_price(&rates, room_type_id, check_in, check_out)
            .map_err(fail)?;
        Ok(serde_json::to_value(quote)?)
    }

    /// Quoting has no side effects; dry run delegates.
    async fn dry_run(&self, input: &Value, ctx: &ToolContext) -> Result<Value> {
        self.execute(input, ctx).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
