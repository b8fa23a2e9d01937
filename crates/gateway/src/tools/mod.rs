//! Builtin tools shipped with the gateway.

mod calculator;
mod escalate;
mod http_request;
mod memory_search;
mod stay_pricing;

use std::sync::Arc;

use crate::runtime::registry::ToolRegistry;

pub use calculator::{evaluate, CalculatorTool};
pub use escalate::EscalateTool;
pub use http_request::HttpRequestTool;
pub use memory_search::MemorySearchTool;
pub use stay_pricing::{
    calculate_stay_price, season_for_date, RateCard, Season, StayPricingTool, StayQuote,
};

/// Register every builtin tool. Projects still opt in per tool through
/// their allow-lists.
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(StayPricingTool));
    registry.register(Arc::new(MemorySearchTool));
    registry.register(Arc::new(HttpRequestTool));
    registry.register(Arc::new(EscalateTool));
}
