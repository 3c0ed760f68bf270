//! Group-by/aggregate routines over filtered deal subsets.

use std::collections::{BTreeMap, HashMap};

use salesdash_core::{Deal, Quarter};
use salesdash_data::Dataset;
use serde::Serialize;

use crate::filter::{filter, filter_manager, filter_period};
use crate::PipelineError;

/// Per-group running totals, kept in first-seen order of the group key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupStats<'d> {
    pub key: &'d str,
    pub count: usize,
    pub sum: f64,
}

/// Groups `rows` by `key`, summing `measure`. Rows whose key is `None` are
/// skipped. Groups come back in the order their first row appears.
pub(crate) fn group_by<'d, K, M>(rows: &[&'d Deal], key: K, measure: M) -> Vec<GroupStats<'d>>
where
    K: Fn(&'d Deal) -> Option<&'d str>,
    M: Fn(&Deal) -> Option<f64>,
{
    let mut index: HashMap<&'d str, usize> = HashMap::new();
    let mut groups: Vec<GroupStats<'d>> = Vec::new();
    for deal in rows.iter().copied() {
        let Some(k) = key(deal) else { continue };
        let Some(v) = measure(deal) else { continue };
        let slot = *index.entry(k).or_insert_with(|| {
            groups.push(GroupStats {
                key: k,
                count: 0,
                sum: 0.0,
            });
            groups.len() - 1
        });
        groups[slot].count += 1;
        groups[slot].sum += v;
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Product,
    Account,
}

impl GroupKey {
    fn of(self, deal: &Deal) -> Option<&str> {
        match self {
            Self::Product => Some(deal.product.as_str()),
            Self::Account => deal.account.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Count,
    SumCloseValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    pub name: String,
    pub value: f64,
}

/// Ranks groups descending by aggregate value. Equal values keep first-seen
/// order.
pub fn rank_by(rows: &[&Deal], group_key: GroupKey, agg_fn: AggFn) -> Vec<RankedEntity> {
    let mut ranked = group_by(rows, |d| group_key.of(d), |d| Some(d.close_value))
        .into_iter()
        .map(|g| RankedEntity {
            name: g.key.to_string(),
            value: match agg_fn {
                AggFn::Count => g.count as f64,
                AggFn::SumCloseValue => g.sum,
            },
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked
}

/// Top group of a won-only subset.
pub fn top_by(
    deals_won: &[&Deal],
    group_key: GroupKey,
    agg_fn: AggFn,
) -> Result<RankedEntity, PipelineError> {
    let component = match (group_key, agg_fn) {
        (GroupKey::Product, AggFn::Count) => "top_product",
        (GroupKey::Product, AggFn::SumCloseValue) => "top_revenue_product",
        (GroupKey::Account, _) => "top_client",
    };
    rank_by(deals_won, group_key, agg_fn)
        .into_iter()
        .next()
        .ok_or(PipelineError::NoData { component })
}

/// Catalog unit price for a product.
pub fn unit_price(dataset: &Dataset, product: &str) -> Result<f64, PipelineError> {
    dataset
        .product_price(product)
        .ok_or_else(|| PipelineError::MissingProduct {
            product: product.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSplit {
    pub manager_name: String,
    pub manager_revenue: f64,
    pub other_revenue: f64,
}

impl RevenueSplit {
    /// Period revenue, added up in whole cents so the two slices always sum
    /// back to the period total.
    pub fn total(&self) -> f64 {
        from_cents(to_cents(self.manager_revenue) + to_cents(self.other_revenue))
    }
}

fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Sum of close values in whole cents.
pub fn revenue_cents<'d>(rows: impl IntoIterator<Item = &'d Deal>) -> i64 {
    rows.into_iter().map(|d| to_cents(d.close_value)).sum()
}

/// Revenue of one manager against every other manager for a fiscal period.
/// All deal stages count.
pub fn revenue_split(
    deals: &[Deal],
    manager: &str,
    fiscal_year: i32,
    quarter: Quarter,
) -> Result<RevenueSplit, PipelineError> {
    let own = filter(deals, manager, fiscal_year, quarter, false);
    let first = own.first().ok_or(PipelineError::NoData {
        component: "revenue_split",
    })?;
    let manager_cents = revenue_cents(own.iter().copied());
    let period_cents = revenue_cents(filter_period(deals, fiscal_year, quarter));
    Ok(RevenueSplit {
        manager_name: first.manager.clone(),
        manager_revenue: from_cents(manager_cents),
        other_revenue: from_cents(period_cents - manager_cents),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterRevenue {
    pub quarter: String,
    pub revenue: f64,
}

/// Revenue per fiscal quarter label for one manager across all years,
/// ascending by label. An empty manager yields an empty series.
pub fn qoq_trend(deals: &[Deal], manager: &str) -> Vec<QuarterRevenue> {
    if manager.trim().is_empty() {
        return Vec::new();
    }
    let mut by_label: BTreeMap<&str, f64> = BTreeMap::new();
    for deal in filter_manager(deals, manager) {
        if let Some(label) = deal.close_quarter_label.as_deref() {
            *by_label.entry(label).or_default() += deal.close_value;
        }
    }
    by_label
        .into_iter()
        .map(|(label, revenue)| QuarterRevenue {
            quarter: label.to_string(),
            revenue,
        })
        .collect()
}
