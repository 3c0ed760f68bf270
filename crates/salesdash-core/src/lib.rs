//! Core domain model for the sales pipeline dashboard.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "salesdash-core";

/// Label used for the "everyone else" slice of the revenue donut.
pub const OTHER_MANAGERS_LABEL: &str = "Other Managers";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown deal stage `{0}`")]
    DealStage(String),
    #[error("unknown quarter `{0}` (expected Q1..Q4)")]
    Quarter(String),
    #[error("unknown metric mode `{0}`")]
    MetricMode(String),
    #[error("unknown bar order `{0}`")]
    BarOrder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStage {
    Open,
    Won,
    Lost,
}

impl FromStr for DealStage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Won" => Ok(Self::Won),
            "Lost" => Ok(Self::Lost),
            // The CRM export splits open deals into two pre-close stages.
            "Open" | "Engaging" | "Prospecting" => Ok(Self::Open),
            other => Err(ParseError::DealStage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        }
    }

    /// Calendar quarter containing `month` (1-based).
    pub fn from_month(month: u32) -> Self {
        match month {
            1..=3 => Self::Q1,
            4..=6 => Self::Q2,
            7..=9 => Self::Q3,
            _ => Self::Q4,
        }
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(Self::Q1),
            "Q2" => Ok(Self::Q2),
            "Q3" => Ok(Self::Q3),
            "Q4" => Ok(Self::Q4),
            _ => Err(ParseError::Quarter(s.to_string())),
        }
    }
}

/// Fiscal quarter label, e.g. `2017-Q1`. Lexicographic order is chronological
/// for four-digit years.
pub fn fiscal_quarter_label(fiscal_year: i32, quarter: Quarter) -> String {
    format!("{fiscal_year}-{quarter}")
}

/// One sales-pipeline opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub opportunity_id: String,
    pub sales_agent: String,
    pub manager: String,
    /// Client account; blank for deals still being prospected.
    pub account: Option<String>,
    pub product: String,
    pub deal_stage: DealStage,
    pub close_fiscal_year: Option<i32>,
    pub quarter: Option<Quarter>,
    pub close_quarter_label: Option<String>,
    pub close_value: f64,
    pub engage_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    /// Whole days between engagement and close.
    pub sale_duration_days: Option<u32>,
}

impl Deal {
    pub fn is_won(&self) -> bool {
        self.deal_stage == DealStage::Won
    }

    pub fn is_closed(&self) -> bool {
        self.close_date.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub sales_agent: String,
    pub manager: String,
    pub regional_office: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product: String,
    pub series: Option<String>,
    pub sales_price: f64,
}

/// Which pair of per-agent bar charts to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    #[default]
    WonCounts,
    RevenueDuration,
}

impl FromStr for MetricMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "won_counts" | "won" => Ok(Self::WonCounts),
            "revenue_duration" | "revenue" => Ok(Self::RevenueDuration),
            other => Err(ParseError::MetricMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarOrder {
    #[default]
    TopToBottom,
    BottomToTop,
}

impl FromStr for BarOrder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "top_to_bottom" | "top" => Ok(Self::TopToBottom),
            "bottom_to_top" | "bottom" => Ok(Self::BottomToTop),
            other => Err(ParseError::BarOrder(other.to_string())),
        }
    }
}

/// Filter selection coming from the dashboard controls.
///
/// `manager` and `fiscal_year` are optional because the controls start out
/// unselected; [`AggregationRequest::selection`] is the gate that turns an
/// incomplete request into a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub manager: Option<String>,
    pub fiscal_year: Option<i32>,
    pub quarter: Quarter,
    #[serde(default)]
    pub metric_mode: MetricMode,
    #[serde(default)]
    pub bar_order: BarOrder,
}

impl AggregationRequest {
    pub fn new(manager: impl Into<String>, fiscal_year: i32, quarter: Quarter) -> Self {
        Self {
            manager: Some(manager.into()),
            fiscal_year: Some(fiscal_year),
            quarter,
            metric_mode: MetricMode::default(),
            bar_order: BarOrder::default(),
        }
    }

    pub fn with_metric_mode(mut self, metric_mode: MetricMode) -> Self {
        self.metric_mode = metric_mode;
        self
    }

    pub fn with_bar_order(mut self, bar_order: BarOrder) -> Self {
        self.bar_order = bar_order;
        self
    }

    /// Selected manager, treating the empty string as unselected.
    pub fn manager(&self) -> Option<&str> {
        self.manager.as_deref().filter(|m| !m.trim().is_empty())
    }

    pub fn selection(&self) -> Option<Selection<'_>> {
        Some(Selection {
            manager: self.manager()?,
            fiscal_year: self.fiscal_year?,
            quarter: self.quarter,
        })
    }
}

/// A complete manager-period selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub manager: &'a str,
    pub fiscal_year: i32,
    pub quarter: Quarter,
}

/// Formats a currency amount as `USD$ 12,345` (no decimals).
pub fn format_usd(value: f64) -> String {
    format!("USD$ {}", format_thousands(value))
}

pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = (rounded.abs() as u64).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deal_stage_accepts_crm_open_aliases() {
        assert_eq!("Won".parse::<DealStage>().unwrap(), DealStage::Won);
        assert_eq!("Engaging".parse::<DealStage>().unwrap(), DealStage::Open);
        assert_eq!("Prospecting".parse::<DealStage>().unwrap(), DealStage::Open);
        assert!("Pending".parse::<DealStage>().is_err());
    }

    #[test]
    fn quarter_labels_sort_chronologically() {
        let mut labels = vec![
            fiscal_quarter_label(2017, Quarter::Q3),
            fiscal_quarter_label(2016, Quarter::Q4),
            fiscal_quarter_label(2017, Quarter::Q1),
        ];
        labels.sort();
        assert_eq!(labels, vec!["2016-Q4", "2017-Q1", "2017-Q3"]);
        assert_eq!(Quarter::from_month(11), Quarter::Q4);
        assert_eq!("q2".parse::<Quarter>().unwrap(), Quarter::Q2);
    }

    #[test]
    fn usd_formatting_groups_thousands_without_decimals() {
        assert_eq!(format_usd(0.0), "USD$ 0");
        assert_eq!(format_usd(999.4), "USD$ 999");
        assert_eq!(format_usd(1096.0), "USD$ 1,096");
        assert_eq!(format_usd(1_234_567.6), "USD$ 1,234,568");
        assert_eq!(format_thousands(-26_768.0), "-26,768");
    }

    #[test]
    fn empty_manager_is_not_a_selection() {
        let mut request = AggregationRequest::new("", 2017, Quarter::Q1);
        assert!(request.selection().is_none());

        request.manager = Some("Dustin Brinkmann".into());
        request.fiscal_year = None;
        assert!(request.selection().is_none());

        request.fiscal_year = Some(2017);
        let selection = request.selection().unwrap();
        assert_eq!(selection.manager, "Dustin Brinkmann");
        assert_eq!(selection.quarter, Quarter::Q1);
    }

    #[test]
    fn request_modes_deserialize_from_snake_case() {
        let request: AggregationRequest = serde_json::from_str(
            r#"{"manager":"A","fiscal_year":2017,"quarter":"Q2","metric_mode":"revenue_duration"}"#,
        )
        .unwrap();
        assert_eq!(request.metric_mode, MetricMode::RevenueDuration);
        assert_eq!(request.bar_order, BarOrder::TopToBottom);
    }
}
