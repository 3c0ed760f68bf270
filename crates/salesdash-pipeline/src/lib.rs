//! Filter + aggregation pipeline behind the sales dashboard.
//!
//! Every entry point is a pure function of the shared [`Dataset`] and an
//! [`AggregationRequest`]. Failures are never fatal: [`DashboardService`]
//! folds them into [`Outcome`] placeholders the page can render directly.

use std::sync::Arc;

use salesdash_core::{format_usd, AggregationRequest, Selection};
use salesdash_data::Dataset;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub mod aggregate;
pub mod agents;
pub mod filter;

pub use aggregate::{
    qoq_trend, rank_by, revenue_cents, revenue_split, top_by, unit_price, AggFn, GroupKey, QuarterRevenue,
    RankedEntity, RevenueSplit,
};
pub use agents::{agent_bars, AgentBar, AgentBars, AgentDuration, AgentWinRate, BarTable};
pub use filter::{filter, filter_manager, filter_period, DealFilter};

pub const CRATE_NAME: &str = "salesdash-pipeline";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("select a manager and a fiscal year")]
    IncompleteSelection,
    #[error("no deals match the selection ({component})")]
    NoData { component: &'static str },
    #[error("product `{product}` is missing from the catalog")]
    MissingProduct { product: String },
}

/// Result of one dashboard output, as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok { value: T },
    Empty { reason: String },
    Incomplete { reason: String },
}

impl<T> Outcome<T> {
    pub fn from_result(result: Result<T, PipelineError>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(err @ PipelineError::IncompleteSelection) => Self::Incomplete {
                reason: err.to_string(),
            },
            Err(err) => Self::Empty {
                reason: err.to_string(),
            },
        }
    }

    pub fn incomplete() -> Self {
        Self::from_result(Err(PipelineError::IncompleteSelection))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

/// Header plus the headline text fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub header: Outcome<String>,
    pub top_product: Outcome<String>,
    pub product_price: Outcome<String>,
    pub top_revenue_product: Outcome<String>,
    pub product_revenue: Outcome<String>,
    pub top_client: Outcome<String>,
}

impl Headline {
    fn incomplete() -> Self {
        Self {
            header: Outcome::incomplete(),
            top_product: Outcome::incomplete(),
            product_price: Outcome::incomplete(),
            top_revenue_product: Outcome::incomplete(),
            product_revenue: Outcome::incomplete(),
            top_client: Outcome::incomplete(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub request: AggregationRequest,
    pub headline: Headline,
    pub revenue_split: Outcome<RevenueSplit>,
    pub agent_bars: Outcome<AgentBars>,
    pub quarter_trend: Outcome<Vec<QuarterRevenue>>,
}

pub fn header_title(manager: &str) -> String {
    format!("Sales Data Analysis by Manager {manager}")
}

/// Entry point used by the presentation layer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DashboardService {
    dataset: Arc<Dataset>,
}

impl DashboardService {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn build(&self, request: &AggregationRequest) -> Dashboard {
        Dashboard {
            request: request.clone(),
            headline: self.headline(request),
            revenue_split: self.revenue_split(request),
            agent_bars: self.agent_bars(request),
            quarter_trend: self.quarter_trend(request),
        }
    }

    pub fn revenue_split(&self, request: &AggregationRequest) -> Outcome<RevenueSplit> {
        let result = selection(request).and_then(|s| {
            revenue_split(self.dataset.deals(), s.manager, s.fiscal_year, s.quarter)
        });
        log_outcome("revenue_split", &result);
        Outcome::from_result(result)
    }

    pub fn headline(&self, request: &AggregationRequest) -> Headline {
        let Ok(s) = selection(request) else {
            return Headline::incomplete();
        };
        let won = DealFilter::for_selection(s).won_only().apply(self.dataset.deals());

        let top_product = top_by(&won, GroupKey::Product, AggFn::Count);
        let product_price = top_product.clone().and_then(|top| {
            unit_price(&self.dataset, &top.name)
                .map(|price| format!("Unit price of {}", format_usd(price)))
        });
        let top_revenue = top_by(&won, GroupKey::Product, AggFn::SumCloseValue);
        let top_client = top_by(&won, GroupKey::Account, AggFn::SumCloseValue);

        log_outcome("top_product", &top_product);
        log_outcome("product_price", &product_price);
        log_outcome("top_client", &top_client);

        Headline {
            header: Outcome::Ok {
                value: header_title(s.manager),
            },
            top_product: Outcome::from_result(top_product.map(|t| t.name)),
            product_price: Outcome::from_result(product_price),
            top_revenue_product: Outcome::from_result(top_revenue.clone().map(|t| t.name)),
            product_revenue: Outcome::from_result(top_revenue.map(|t| format_usd(t.value))),
            top_client: Outcome::from_result(top_client.map(|t| t.name)),
        }
    }

    pub fn agent_bars(&self, request: &AggregationRequest) -> Outcome<AgentBars> {
        let result = selection(request).map(|s| {
            let rows = DealFilter::for_selection(s).apply(self.dataset.deals());
            agent_bars(&rows, request.metric_mode, request.bar_order)
        });
        log_outcome("agent_bars", &result);
        Outcome::from_result(result)
    }

    /// Needs only a manager; the fiscal period selection is ignored.
    pub fn quarter_trend(&self, request: &AggregationRequest) -> Outcome<Vec<QuarterRevenue>> {
        let result = request
            .manager()
            .map(|manager| qoq_trend(self.dataset.deals(), manager))
            .ok_or(PipelineError::IncompleteSelection);
        log_outcome("quarter_trend", &result);
        Outcome::from_result(result)
    }
}

fn selection(request: &AggregationRequest) -> Result<Selection<'_>, PipelineError> {
    request.selection().ok_or(PipelineError::IncompleteSelection)
}

fn log_outcome<T>(component: &str, result: &Result<T, PipelineError>) {
    match result {
        Ok(_) => debug!(component, "aggregation ready"),
        Err(PipelineError::IncompleteSelection) => debug!(component, "selection incomplete"),
        Err(err @ PipelineError::NoData { .. }) => debug!(component, %err, "placeholder"),
        Err(err @ PipelineError::MissingProduct { .. }) => warn!(component, %err, "placeholder"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::NaiveDate;
    use salesdash_core::{fiscal_quarter_label, Deal, DealStage, Quarter};

    /// Deal closed in the middle of the given quarter.
    pub fn deal(
        id: &str,
        manager: &str,
        agent: &str,
        year: i32,
        quarter: Quarter,
        stage: DealStage,
        value: f64,
    ) -> Deal {
        let month = match quarter {
            Quarter::Q1 => 2,
            Quarter::Q2 => 5,
            Quarter::Q3 => 8,
            Quarter::Q4 => 11,
        };
        Deal {
            opportunity_id: id.to_string(),
            sales_agent: agent.to_string(),
            manager: manager.to_string(),
            account: Some("Acme".to_string()),
            product: "GTXPro".to_string(),
            deal_stage: stage,
            close_fiscal_year: Some(year),
            quarter: Some(quarter),
            close_quarter_label: Some(fiscal_quarter_label(year, quarter)),
            close_value: value,
            engage_date: None,
            close_date: NaiveDate::from_ymd_opt(year, month, 15),
            sale_duration_days: None,
        }
    }

    /// Won deal for manager `A` in 2017-Q1 with an explicit product/account.
    pub fn deal_for(id: &str, agent: &str, product: &str, account: &str, value: f64) -> Deal {
        let mut d = deal(id, "A", agent, 2017, Quarter::Q1, DealStage::Won, value);
        d.product = product.to_string();
        d.account = Some(account.to_string());
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deal, deal_for};
    use salesdash_core::{DealStage, MetricMode, Product, Quarter};

    fn service() -> DashboardService {
        let deals = vec![
            deal_for("1", "Ann", "GTXPro", "Acme", 4000.0),
            deal_for("2", "Ann", "MG Special", "Betatech", 55.0),
            deal_for("3", "Bob", "MG Special", "Betatech", 60.0),
            deal("4", "A", "Bob", 2017, Quarter::Q1, DealStage::Lost, 0.0),
            deal("5", "B", "Cid", 2017, Quarter::Q1, DealStage::Won, 1000.0),
            deal("6", "A", "Ann", 2016, Quarter::Q4, DealStage::Won, 700.0),
        ];
        let products = vec![Product {
            product: "MG Special".into(),
            series: Some("MG".into()),
            sales_price: 55.0,
        }];
        DashboardService::new(Arc::new(Dataset::from_tables(deals, vec![], products)))
    }

    #[test]
    fn complete_request_fills_every_output() {
        let dashboard = service().build(&AggregationRequest::new("A", 2017, Quarter::Q1));
        let headline = &dashboard.headline;

        assert_eq!(
            headline.header.value().unwrap(),
            "Sales Data Analysis by Manager A"
        );
        assert_eq!(headline.top_product.value().unwrap(), "MG Special");
        assert_eq!(headline.product_price.value().unwrap(), "Unit price of USD$ 55");
        assert_eq!(headline.top_revenue_product.value().unwrap(), "GTXPro");
        assert_eq!(headline.product_revenue.value().unwrap(), "USD$ 4,000");
        assert_eq!(headline.top_client.value().unwrap(), "Acme");

        let split = dashboard.revenue_split.value().unwrap();
        assert_eq!(split.manager_revenue, 4115.0);
        assert_eq!(split.other_revenue, 1000.0);

        let trend = dashboard.quarter_trend.value().unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].quarter, "2016-Q4");
    }

    #[test]
    fn missing_catalog_entry_only_blanks_the_price() {
        let mut request = AggregationRequest::new("A", 2017, Quarter::Q1);
        request.metric_mode = MetricMode::RevenueDuration;
        let svc = service();
        let dataset = Dataset::from_tables(svc.dataset().deals().to_vec(), vec![], vec![]);
        let headline = DashboardService::new(Arc::new(dataset)).headline(&request);

        assert!(headline.top_product.is_ok());
        assert_eq!(
            headline.product_price,
            Outcome::Empty {
                reason: "product `MG Special` is missing from the catalog".into()
            }
        );
    }

    #[test]
    fn unmatched_period_yields_empty_placeholders() {
        let dashboard = service().build(&AggregationRequest::new("A", 2018, Quarter::Q3));
        assert!(matches!(dashboard.revenue_split, Outcome::Empty { .. }));
        assert!(matches!(dashboard.headline.top_client, Outcome::Empty { .. }));
        assert!(dashboard.headline.header.is_ok());

        let bars = dashboard.agent_bars.value().unwrap();
        assert!(bars.primary.is_empty() && bars.secondary.is_empty());
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let ok: Outcome<String> = Outcome::Ok { value: "GTXPro".into() };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "ok", "value": "GTXPro"})
        );
        let incomplete: Outcome<String> = Outcome::incomplete();
        assert_eq!(
            serde_json::to_value(&incomplete).unwrap()["status"],
            "incomplete"
        );
    }
}
