//! Per-agent bar tables for the two metric modes.

use std::collections::HashMap;

use salesdash_core::{BarOrder, Deal, MetricMode};
use serde::Serialize;

use crate::aggregate::group_by;

pub const AGENT_AXIS_LABEL: &str = "Sales Agent";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBar {
    pub sales_agent: String,
    pub value: f64,
}

/// One ranked bar chart: title, axis labels and bars in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarTable {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub bars: Vec<AgentBar>,
}

impl BarTable {
    fn new(title: &str, y_label: &str, bars: Vec<AgentBar>) -> Self {
        Self {
            title: title.to_string(),
            x_label: AGENT_AXIS_LABEL.to_string(),
            y_label: y_label.to_string(),
            bars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBars {
    pub mode: MetricMode,
    pub primary: BarTable,
    pub secondary: BarTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentWinRate {
    pub sales_agent: String,
    pub won_deals: usize,
    pub total_deals: usize,
    pub percen_won: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDuration {
    pub sales_agent: String,
    pub won_deals: usize,
    pub ave_sale_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Descending,
    Ascending,
}

impl Direction {
    fn under(self, order: BarOrder) -> Self {
        match (self, order) {
            (d, BarOrder::TopToBottom) => d,
            (Self::Descending, BarOrder::BottomToTop) => Self::Ascending,
            (Self::Ascending, BarOrder::BottomToTop) => Self::Descending,
        }
    }
}

fn sort_bars(bars: &mut [AgentBar], direction: Direction) {
    match direction {
        Direction::Descending => bars.sort_by(|a, b| b.value.total_cmp(&a.value)),
        Direction::Ascending => bars.sort_by(|a, b| a.value.total_cmp(&b.value)),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Won-deal count per agent over a won-only subset, first-seen order.
pub fn won_counts_by_agent(won: &[&Deal]) -> Vec<AgentBar> {
    group_by(won, |d| Some(d.sales_agent.as_str()), |_| Some(0.0))
        .into_iter()
        .map(|g| AgentBar {
            sales_agent: g.key.to_string(),
            value: g.count as f64,
        })
        .collect()
}

/// Summed close value per agent over a won-only subset, first-seen order.
pub fn revenue_by_agent(won: &[&Deal]) -> Vec<AgentBar> {
    group_by(won, |d| Some(d.sales_agent.as_str()), |d| Some(d.close_value))
        .into_iter()
        .map(|g| AgentBar {
            sales_agent: g.key.to_string(),
            value: g.sum,
        })
        .collect()
}

/// Win percentage per agent over a full manager-period subset, descending.
///
/// `total_deals` counts rows that have a close date; agents with no such row
/// are dropped. Agents with closed deals but no wins report 0.0.
pub fn win_rates(period_rows: &[&Deal]) -> Vec<AgentWinRate> {
    let closed = period_rows
        .iter()
        .copied()
        .filter(|d| d.is_closed())
        .collect::<Vec<_>>();
    let won = period_rows
        .iter()
        .copied()
        .filter(|d| d.is_won())
        .collect::<Vec<_>>();
    let won_by_agent = group_by(&won, |d| Some(d.sales_agent.as_str()), |_| Some(0.0))
        .into_iter()
        .map(|g| (g.key, g.count))
        .collect::<HashMap<_, _>>();

    let mut rates = group_by(&closed, |d| Some(d.sales_agent.as_str()), |_| Some(0.0))
        .into_iter()
        .map(|total| {
            let won_deals = won_by_agent.get(total.key).copied().unwrap_or(0);
            AgentWinRate {
                sales_agent: total.key.to_string(),
                won_deals,
                total_deals: total.count,
                percen_won: round1(100.0 * won_deals as f64 / total.count as f64),
            }
        })
        .collect::<Vec<_>>();
    let position = first_seen_positions(period_rows);
    rates.sort_by_key(|r| position.get(r.sales_agent.as_str()).copied().unwrap_or(usize::MAX));
    rates.sort_by(|a, b| b.percen_won.total_cmp(&a.percen_won));
    rates
}

/// Mean days-to-close per agent over won deals, ascending (fastest first).
///
/// Only agents present in the closed-deal totals, with at least one won deal
/// carrying a duration, are kept.
pub fn average_durations(period_rows: &[&Deal]) -> Vec<AgentDuration> {
    let won = period_rows
        .iter()
        .copied()
        .filter(|d| d.is_won())
        .collect::<Vec<_>>();
    let durations = group_by(
        &won,
        |d| Some(d.sales_agent.as_str()),
        |d| d.sale_duration_days.map(f64::from),
    )
    .into_iter()
    .map(|g| (g.key, (g.count, g.sum)))
    .collect::<HashMap<_, _>>();

    let mut out = win_rates(period_rows)
        .into_iter()
        .filter(|rate| rate.won_deals > 0)
        .filter_map(|rate| {
            let (samples, total_days) = durations.get(rate.sales_agent.as_str()).copied()?;
            Some(AgentDuration {
                ave_sale_duration: round1(total_days / samples as f64),
                sales_agent: rate.sales_agent,
                won_deals: rate.won_deals,
            })
        })
        .collect::<Vec<_>>();
    // Re-establish first-seen order before ranking on the new measure.
    let position = first_seen_positions(period_rows);
    out.sort_by_key(|d| position.get(d.sales_agent.as_str()).copied().unwrap_or(usize::MAX));
    out.sort_by(|a, b| a.ave_sale_duration.total_cmp(&b.ave_sale_duration));
    out
}

/// Agent -> index of its first row in `rows`. Ties in every per-agent table
/// fall back to this order.
fn first_seen_positions<'d>(rows: &[&'d Deal]) -> HashMap<&'d str, usize> {
    let mut position = HashMap::new();
    for deal in rows {
        let next = position.len();
        position.entry(deal.sales_agent.as_str()).or_insert(next);
    }
    position
}

fn sort_first_seen(bars: &mut [AgentBar], position: &HashMap<&str, usize>) {
    bars.sort_by_key(|b| position.get(b.sales_agent.as_str()).copied().unwrap_or(usize::MAX));
}

/// Both bar tables for a manager-period subset.
///
/// `period_rows` is the full manager-period subset (every stage). An empty
/// subset yields empty tables.
pub fn agent_bars(period_rows: &[&Deal], mode: MetricMode, order: BarOrder) -> AgentBars {
    let won = period_rows
        .iter()
        .copied()
        .filter(|d| d.is_won())
        .collect::<Vec<_>>();
    let position = first_seen_positions(period_rows);

    let (primary, secondary) = match mode {
        MetricMode::WonCounts => {
            let mut counts = won_counts_by_agent(&won);
            sort_first_seen(&mut counts, &position);
            sort_bars(&mut counts, Direction::Descending.under(order));

            let mut rates = win_rates(period_rows)
                .into_iter()
                .map(|r| AgentBar {
                    sales_agent: r.sales_agent,
                    value: r.percen_won,
                })
                .collect::<Vec<_>>();
            sort_bars(&mut rates, Direction::Descending.under(order));

            (
                BarTable::new("'Won' Deals by Count", "Frequency", counts),
                BarTable::new("Percentage of 'Won' Deals", "Percentage Won (%)", rates),
            )
        }
        MetricMode::RevenueDuration => {
            let mut revenue = revenue_by_agent(&won);
            sort_first_seen(&mut revenue, &position);
            sort_bars(&mut revenue, Direction::Descending.under(order));

            let mut durations = average_durations(period_rows)
                .into_iter()
                .map(|d| AgentBar {
                    sales_agent: d.sales_agent,
                    value: d.ave_sale_duration,
                })
                .collect::<Vec<_>>();
            sort_bars(&mut durations, Direction::Ascending.under(order));

            (
                BarTable::new("Revenue Generated by Agent", "Revenue", revenue),
                BarTable::new(
                    "Average Days to Close Deals",
                    "Average duration to close deals (days)",
                    durations,
                ),
            )
        }
    };

    AgentBars {
        mode,
        primary,
        secondary,
    }
}
