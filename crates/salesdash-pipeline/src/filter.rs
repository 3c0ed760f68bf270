//! Row selection over the immutable deal table.
//!
//! Filters borrow rows from the base table and never copy or mutate them.
//! Predicates are independent equality checks, so the order in which they are
//! applied does not change the result.

use salesdash_core::{Deal, Quarter, Selection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealFilter<'a> {
    manager: Option<&'a str>,
    fiscal_year: Option<i32>,
    quarter: Option<Quarter>,
    won_only: bool,
}

impl<'a> DealFilter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager-period filter for a complete selection.
    pub fn for_selection(selection: Selection<'a>) -> Self {
        Self::new()
            .manager(selection.manager)
            .fiscal_year(selection.fiscal_year)
            .quarter(selection.quarter)
    }

    pub fn manager(mut self, manager: &'a str) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn fiscal_year(mut self, fiscal_year: i32) -> Self {
        self.fiscal_year = Some(fiscal_year);
        self
    }

    pub fn quarter(mut self, quarter: Quarter) -> Self {
        self.quarter = Some(quarter);
        self
    }

    pub fn won_only(mut self) -> Self {
        self.won_only = true;
        self
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        self.manager.map_or(true, |m| deal.manager == m)
            && self
                .fiscal_year
                .map_or(true, |y| deal.close_fiscal_year == Some(y))
            && self.quarter.map_or(true, |q| deal.quarter == Some(q))
            && (!self.won_only || deal.is_won())
    }

    /// Keeps matching rows in their source order.
    pub fn apply<'d, I>(&self, rows: I) -> Vec<&'d Deal>
    where
        I: IntoIterator<Item = &'d Deal>,
    {
        rows.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// Manager-period subset, optionally restricted to won deals.
pub fn filter<'d>(
    deals: &'d [Deal],
    manager: &str,
    fiscal_year: i32,
    quarter: Quarter,
    require_won: bool,
) -> Vec<&'d Deal> {
    let mut predicate = DealFilter::new()
        .manager(manager)
        .fiscal_year(fiscal_year)
        .quarter(quarter);
    if require_won {
        predicate = predicate.won_only();
    }
    predicate.apply(deals)
}

/// All deals of one manager regardless of period.
pub fn filter_manager<'d>(deals: &'d [Deal], manager: &str) -> Vec<&'d Deal> {
    DealFilter::new().manager(manager).apply(deals)
}

/// All managers' deals closed in one fiscal period.
pub fn filter_period(deals: &[Deal], fiscal_year: i32, quarter: Quarter) -> Vec<&Deal> {
    DealFilter::new()
        .fiscal_year(fiscal_year)
        .quarter(quarter)
        .apply(deals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::deal;
    use proptest::prelude::*;
    use salesdash_core::DealStage;

    fn ids(rows: &[&Deal]) -> Vec<String> {
        rows.iter().map(|d| d.opportunity_id.clone()).collect()
    }

    #[test]
    fn manager_period_filter_and_won_restriction() {
        let deals = vec![
            deal("1", "A", "ag1", 2017, Quarter::Q1, DealStage::Won, 10.0),
            deal("2", "A", "ag1", 2017, Quarter::Q1, DealStage::Lost, 0.0),
            deal("3", "A", "ag1", 2017, Quarter::Q2, DealStage::Won, 10.0),
            deal("4", "B", "ag2", 2017, Quarter::Q1, DealStage::Won, 10.0),
            deal("5", "A", "ag1", 2016, Quarter::Q1, DealStage::Won, 10.0),
        ];

        assert_eq!(ids(&filter(&deals, "A", 2017, Quarter::Q1, false)), vec!["1", "2"]);
        assert_eq!(ids(&filter(&deals, "A", 2017, Quarter::Q1, true)), vec!["1"]);
        assert_eq!(ids(&filter_period(&deals, 2017, Quarter::Q1)), vec!["1", "2", "4"]);
        assert_eq!(ids(&filter_manager(&deals, "A")), vec!["1", "2", "3", "5"]);
        assert!(filter(&deals, "C", 2017, Quarter::Q1, false).is_empty());
    }

    #[test]
    fn open_deals_without_period_never_match_a_period() {
        let mut open = deal("1", "A", "ag1", 2017, Quarter::Q1, DealStage::Open, 0.0);
        open.close_fiscal_year = None;
        open.quarter = None;
        let deals = vec![open];
        assert!(filter_period(&deals, 2017, Quarter::Q1).is_empty());
        assert_eq!(filter_manager(&deals, "A").len(), 1);
    }

    fn arb_deal() -> impl Strategy<Value = Deal> {
        (
            0u32..1000,
            prop_oneof![Just("A"), Just("B"), Just("C")],
            2016i32..=2018,
            prop_oneof![Just(Quarter::Q1), Just(Quarter::Q2), Just(Quarter::Q3), Just(Quarter::Q4)],
            prop_oneof![Just(DealStage::Won), Just(DealStage::Lost), Just(DealStage::Open)],
        )
            .prop_map(|(id, manager, year, quarter, stage)| {
                deal(&id.to_string(), manager, "agent", year, quarter, stage, 1.0)
            })
    }

    proptest! {
        #[test]
        fn predicate_order_does_not_change_the_subset(
            deals in prop::collection::vec(arb_deal(), 0..40),
            manager in prop_oneof![Just("A"), Just("B"), Just("C")],
            year in 2016i32..=2018,
            quarter in prop_oneof![Just(Quarter::Q1), Just(Quarter::Q4)],
        ) {
            let combined = filter(&deals, manager, year, quarter, true);

            let by_quarter = DealFilter::new().quarter(quarter).apply(&deals);
            let by_won = DealFilter::new().won_only().apply(by_quarter.iter().copied());
            let by_year = DealFilter::new().fiscal_year(year).apply(by_won.iter().copied());
            let chained = DealFilter::new().manager(manager).apply(by_year.iter().copied());

            prop_assert_eq!(ids(&combined), ids(&chained));
        }

        #[test]
        fn filtering_twice_is_filtering_once(
            deals in prop::collection::vec(arb_deal(), 0..40),
            year in 2016i32..=2018,
        ) {
            let predicate = DealFilter::new().manager("A").fiscal_year(year);
            let once = predicate.apply(&deals);
            let twice = predicate.apply(once.iter().copied());
            prop_assert_eq!(ids(&once), ids(&twice));
        }
    }
}
