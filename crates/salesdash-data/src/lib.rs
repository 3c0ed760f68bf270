//! Immutable dataset loading for the sales dashboard.
//!
//! The three source tables are read once at startup and never mutated; every
//! aggregation borrows from the same [`Dataset`].

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use salesdash_core::{fiscal_quarter_label, Deal, DealStage, Product, Quarter, TeamMember};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, info_span};

pub const CRATE_NAME: &str = "salesdash-data";

pub const DEALS_FILE: &str = "sales_pipeline.csv";
pub const TEAMS_FILE: &str = "sales_teams.csv";
pub const PRODUCTS_FILE: &str = "products.csv";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    /// Hide the earliest fiscal year from the year selector. The first bucket
    /// of the export only holds a handful of early closes.
    pub drop_earliest_year: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            drop_earliest_year: true,
        }
    }
}

impl DataConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("SALESDASH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            drop_earliest_year: std::env::var("SALESDASH_DROP_EARLIEST_YEAR")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"))
                .unwrap_or(defaults.drop_earliest_year),
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("{file} row {row}: {message}")]
    InvalidRow {
        file: &'static str,
        row: usize,
        message: String,
    },
    #[error("{file}: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

impl DatasetError {
    fn invalid(file: &'static str, row: usize, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            file,
            row,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DealRow {
    opportunity_id: String,
    sales_agent: String,
    product: String,
    account: Option<String>,
    deal_stage: String,
    engage_date: Option<String>,
    close_date: Option<String>,
    close_value: Option<f64>,
    manager: String,
    #[serde(default)]
    close_fiscal_year: Option<i32>,
    #[serde(default)]
    quarter_tags: Option<String>,
    #[serde(default)]
    close_quarter_tags: Option<String>,
    #[serde(default)]
    sale_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamRow {
    sales_agent: String,
    manager: String,
    #[serde(default)]
    regional_office: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    product: String,
    #[serde(default)]
    series: Option<String>,
    sales_price: f64,
}

/// Distinct values offered by the dashboard selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorOptions {
    pub managers: Vec<String>,
    pub fiscal_years: Vec<i32>,
    pub quarters: Vec<Quarter>,
}

/// Read-only base tables shared by every aggregation call.
#[derive(Debug, Clone)]
pub struct Dataset {
    deals: Vec<Deal>,
    teams: Vec<TeamMember>,
    products: Vec<Product>,
    fingerprint: String,
}

impl Dataset {
    /// Builds a dataset from already-parsed tables. The fingerprint is derived
    /// from the table contents.
    pub fn from_tables(deals: Vec<Deal>, teams: Vec<TeamMember>, products: Vec<Product>) -> Self {
        let mut hasher = Sha256::new();
        for deal in &deals {
            hasher.update(deal.opportunity_id.as_bytes());
            hasher.update(deal.manager.as_bytes());
            hasher.update(deal.close_value.to_bits().to_le_bytes());
        }
        for member in &teams {
            hasher.update(member.sales_agent.as_bytes());
            hasher.update(member.manager.as_bytes());
        }
        for product in &products {
            hasher.update(product.product.as_bytes());
            hasher.update(product.sales_price.to_bits().to_le_bytes());
        }
        Self {
            deals,
            teams,
            products,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }

    /// Loads `sales_pipeline.csv`, `sales_teams.csv` and `products.csv` from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let span = info_span!("dataset_load", dir = %dir.display());
        let _guard = span.enter();

        let deals_bytes = read_table(dir, DEALS_FILE)?;
        let teams_bytes = read_table(dir, TEAMS_FILE)?;
        let products_bytes = read_table(dir, PRODUCTS_FILE)?;

        let deals = parse_deals(deals_bytes.as_slice())?;
        let teams = parse_teams(teams_bytes.as_slice())?;
        let products = parse_products(products_bytes.as_slice())?;

        let fingerprint = sha256_hex(&[&deals_bytes, &teams_bytes, &products_bytes]);
        info!(
            deals = deals.len(),
            agents = teams.len(),
            products = products.len(),
            %fingerprint,
            "dataset loaded"
        );

        Ok(Self {
            deals,
            teams,
            products,
            fingerprint,
        })
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    /// Hex SHA-256 over the source tables.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Catalog price for `product`, summed across catalog rows with that name.
    /// `None` when the product is not in the catalog at all.
    pub fn product_price(&self, product: &str) -> Option<f64> {
        self.products
            .iter()
            .filter(|p| p.product == product)
            .map(|p| p.sales_price)
            .fold(None, |acc, price| Some(acc.unwrap_or(0.0) + price))
    }

    /// Distinct managers from the roster, in first-seen order.
    pub fn managers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.teams
            .iter()
            .filter(|m| seen.insert(m.manager.as_str()))
            .map(|m| m.manager.clone())
            .collect()
    }

    /// Distinct fiscal years present in the deal table, ascending.
    pub fn fiscal_years(&self, drop_earliest: bool) -> Vec<i32> {
        let mut years = self
            .deals
            .iter()
            .filter_map(|d| d.close_fiscal_year)
            .collect::<Vec<_>>();
        years.sort_unstable();
        years.dedup();
        if drop_earliest && !years.is_empty() {
            years.remove(0);
        }
        years
    }

    pub fn options(&self, drop_earliest_year: bool) -> SelectorOptions {
        SelectorOptions {
            managers: self.managers(),
            fiscal_years: self.fiscal_years(drop_earliest_year),
            quarters: Quarter::ALL.to_vec(),
        }
    }
}

fn read_table(dir: &Path, file: &str) -> anyhow::Result<Vec<u8>> {
    let path = dir.join(file);
    let mut bytes = Vec::new();
    std::fs::File::open(&path)
        .with_context(|| format!("opening table {}", path.display()))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading table {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "table read");
    Ok(bytes)
}

pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

pub fn parse_deals<R: Read>(input: R) -> Result<Vec<Deal>, DatasetError> {
    let mut reader = csv_reader(input);
    let mut out = Vec::new();
    for (idx, result) in reader.deserialize::<DealRow>().enumerate() {
        let row = result.map_err(|source| DatasetError::Csv {
            file: DEALS_FILE,
            source,
        })?;
        out.push(deal_from_row(row, idx + 1)?);
    }
    Ok(out)
}

pub fn parse_teams<R: Read>(input: R) -> Result<Vec<TeamMember>, DatasetError> {
    let mut reader = csv_reader(input);
    let mut out = Vec::new();
    for result in reader.deserialize::<TeamRow>() {
        let row = result.map_err(|source| DatasetError::Csv {
            file: TEAMS_FILE,
            source,
        })?;
        out.push(TeamMember {
            sales_agent: row.sales_agent,
            manager: row.manager,
            regional_office: non_blank(row.regional_office),
        });
    }
    Ok(out)
}

pub fn parse_products<R: Read>(input: R) -> Result<Vec<Product>, DatasetError> {
    let mut reader = csv_reader(input);
    let mut out = Vec::new();
    for result in reader.deserialize::<ProductRow>() {
        let row = result.map_err(|source| DatasetError::Csv {
            file: PRODUCTS_FILE,
            source,
        })?;
        out.push(Product {
            product: row.product,
            series: non_blank(row.series),
            sales_price: row.sales_price,
        });
    }
    Ok(out)
}

fn deal_from_row(row: DealRow, line: usize) -> Result<Deal, DatasetError> {
    let invalid = |message: String| DatasetError::invalid(DEALS_FILE, line, message);

    if row.sales_agent.is_empty() || row.manager.is_empty() {
        return Err(invalid("sales_agent and manager are required".into()));
    }
    let deal_stage = row
        .deal_stage
        .parse::<DealStage>()
        .map_err(|e| invalid(e.to_string()))?;
    let engage_date = parse_date(row.engage_date.as_deref()).map_err(&invalid)?;
    let close_date = parse_date(row.close_date.as_deref()).map_err(&invalid)?;

    let close_fiscal_year = row.close_fiscal_year.or(close_date.map(|d| d.year()));
    let quarter = match non_blank(row.quarter_tags) {
        Some(tag) => Some(tag.parse::<Quarter>().map_err(|e| invalid(e.to_string()))?),
        None => close_date.map(Quarter::of_date),
    };
    let close_quarter_label = non_blank(row.close_quarter_tags).or_else(|| {
        close_fiscal_year
            .zip(quarter)
            .map(|(year, q)| fiscal_quarter_label(year, q))
    });

    let sale_duration_days = match non_blank(row.sale_duration) {
        Some(raw) => Some(
            parse_duration_days(&raw)
                .ok_or_else(|| invalid(format!("unreadable sale_duration `{raw}`")))?,
        ),
        None => engage_date
            .zip(close_date)
            .map(|(engaged, closed)| (closed - engaged).num_days())
            .and_then(|days| u32::try_from(days).ok()),
    };

    Ok(Deal {
        opportunity_id: row.opportunity_id,
        sales_agent: row.sales_agent,
        manager: row.manager,
        account: non_blank(row.account),
        product: row.product,
        deal_stage,
        close_fiscal_year,
        quarter,
        close_quarter_label,
        close_value: row.close_value.unwrap_or(0.0),
        engage_date,
        close_date,
        sale_duration_days,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, DATE_FORMAT)
            .map(Some)
            .map_err(|e| format!("bad date `{v}`: {e}")),
    }
}

/// Reads a day count stored either as a plain integer (`45`) or as an elapsed
/// duration rendering (`45 days 00:00:00`). Only the leading whole-day token
/// is used.
pub fn parse_duration_days(raw: &str) -> Option<u32> {
    let token = raw.split_whitespace().next()?;
    if let Ok(days) = token.parse::<u32>() {
        return Some(days);
    }
    let days = token.parse::<f64>().ok()?;
    (days.is_finite() && days >= 0.0).then(|| days.floor() as u32)
}
