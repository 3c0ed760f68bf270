use std::sync::Arc;

use salesdash_core::{AggregationRequest, Deal, DealStage, Quarter};
use salesdash_data::Dataset;
use salesdash_pipeline::{
    filter, revenue_cents, revenue_split, top_by, AggFn, DashboardService, GroupKey, Outcome,
};

fn won(manager: &str, product: &str, value: f64) -> Deal {
    Deal {
        opportunity_id: format!("{manager}-{product}-{value}"),
        sales_agent: format!("{manager} agent"),
        manager: manager.to_string(),
        account: Some("Acme".to_string()),
        product: product.to_string(),
        deal_stage: DealStage::Won,
        close_fiscal_year: Some(2017),
        quarter: Some(Quarter::Q1),
        close_quarter_label: Some("2017-Q1".to_string()),
        close_value: value,
        engage_date: None,
        close_date: chrono::NaiveDate::from_ymd_opt(2017, 2, 1),
        sale_duration_days: Some(30),
    }
}

fn three_deals() -> Vec<Deal> {
    vec![won("A", "X", 100.0), won("A", "Y", 50.0), won("B", "X", 30.0)]
}

#[test]
fn two_manager_split_and_top_revenue_product() {
    let deals = three_deals();

    let split = revenue_split(&deals, "A", 2017, Quarter::Q1).expect("split");
    assert_eq!(
        (split.manager_name.as_str(), split.manager_revenue, split.other_revenue),
        ("A", 150.0, 30.0)
    );

    let won_rows = filter(&deals, "A", 2017, Quarter::Q1, true);
    let top = top_by(&won_rows, GroupKey::Product, AggFn::SumCloseValue).expect("top");
    assert_eq!(top.name, "X");
}

#[test]
fn split_always_adds_up_to_period_revenue() {
    let mut deals = three_deals();
    deals.push(won("B", "Z", 0.7));
    deals.push(won("A", "Z", 0.2));
    deals.push(won("B", "Y", 0.1));
    let period_total = revenue_cents(&deals) as f64 / 100.0;
    for manager in ["A", "B"] {
        let split = revenue_split(&deals, manager, 2017, Quarter::Q1).expect("split");
        assert_eq!(split.total(), period_total);
    }
}

#[test]
fn empty_manager_is_incomplete_everywhere() {
    let service = DashboardService::new(Arc::new(Dataset::from_tables(three_deals(), vec![], vec![])));
    let dashboard = service.build(&AggregationRequest::new("", 2017, Quarter::Q1));

    let headline = &dashboard.headline;
    for outcome in [
        &headline.header,
        &headline.top_product,
        &headline.product_price,
        &headline.top_revenue_product,
        &headline.product_revenue,
        &headline.top_client,
    ] {
        assert!(outcome.is_incomplete(), "{outcome:?}");
    }
    assert!(dashboard.revenue_split.is_incomplete());
    assert!(dashboard.agent_bars.is_incomplete());
    assert!(dashboard.quarter_trend.is_incomplete());
}

#[test]
fn missing_year_still_allows_the_trend() {
    let service = DashboardService::new(Arc::new(Dataset::from_tables(three_deals(), vec![], vec![])));
    let mut request = AggregationRequest::new("A", 2017, Quarter::Q1);
    request.fiscal_year = None;

    let dashboard = service.build(&request);
    assert!(dashboard.revenue_split.is_incomplete());
    match dashboard.quarter_trend {
        Outcome::Ok { value } => {
            assert_eq!(value.len(), 1);
            assert_eq!(value[0].revenue, 150.0);
        }
        other => panic!("expected trend, got {other:?}"),
    }
}
