use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use web3::types::Address;

use crate::filter::{filter_tokens, MatchMode};
use crate::types::{InterestRates, MarketSnapshot, TokenData, TokenEntry};
use crate::utils::format_percentage;

pub const LOADING: &str = "…";
pub const MISSING: &str = "\u{2013}";

pub const HEADERS: [&str; 5] = ["Asset", "Compound", "Aave", "Fuse P1", "Fuse P2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateTable {
    #[default]
    Lending,
    Borrowing,
}

impl RateTable {
    pub fn label(&self) -> &'static str {
        match self {
            RateTable::Lending => "Lending Rates",
            RateTable::Borrowing => "Borrowing Rates",
        }
    }

    pub fn pick(&self, rates: &InterestRates) -> Decimal {
        match self {
            RateTable::Lending => rates.lending,
            RateTable::Borrowing => rates.borrowing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateCell {
    Loading,
    Missing,
    Rate(Decimal),
}

impl RateCell {
    /// A protocol without an entry for the token shows loading until every source has
    /// answered once, and a dash afterwards.
    pub fn new(rates: Option<&InterestRates>, table: RateTable, market_data_loaded: bool) -> Self {
        match rates {
            Some(rates) => RateCell::Rate(table.pick(rates)),
            None if market_data_loaded => RateCell::Missing,
            None => RateCell::Loading,
        }
    }
}

impl fmt::Display for RateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateCell::Loading => f.write_str(LOADING),
            RateCell::Missing => f.write_str(MISSING),
            RateCell::Rate(rate) => f.write_str(&format_percentage(*rate)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestRatesRow {
    pub address: Address,
    pub asset: Option<TokenData>,
    pub compound: RateCell,
    pub aave: RateCell,
    pub fuse_p1: RateCell,
    pub fuse_p2: RateCell,
}

impl InterestRatesRow {
    fn asset_title(&self) -> String {
        match &self.asset {
            Some(token) => format!("{} ({})", token.name, token.symbol),
            None => LOADING.to_string(),
        }
    }

    fn cells(&self) -> [String; 5] {
        [
            self.asset_title(),
            self.compound.to_string(),
            self.aave.to_string(),
            self.fuse_p1.to_string(),
            self.fuse_p2.to_string(),
        ]
    }
}

/// What the user picked: rate kind and search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub table: RateTable,
    pub search: String,
    pub mode: MatchMode,
}

fn index(snapshot: &MarketSnapshot) -> HashMap<Address, &InterestRates> {
    let mut by_address = HashMap::new();
    if let Some(markets) = snapshot {
        for market in markets.iter() {
            // First listing wins when a protocol has several markets for one token.
            by_address.entry(market.token_address).or_insert(&market.rates);
        }
    }
    by_address
}

pub fn build_rows(
    tokens: &[&TokenEntry],
    aave: &MarketSnapshot,
    compound: &MarketSnapshot,
    table: RateTable,
) -> Vec<InterestRatesRow> {
    let market_data_loaded = aave.is_some() && compound.is_some();
    let aave_rates = index(aave);
    let compound_rates = index(compound);

    tokens
        .iter()
        .map(|entry| InterestRatesRow {
            address: entry.address,
            asset: entry.data.clone(),
            compound: RateCell::new(compound_rates.get(&entry.address).copied(), table, market_data_loaded),
            aave: RateCell::new(aave_rates.get(&entry.address).copied(), table, market_data_loaded),
            // First-party pools are not wired up yet.
            fuse_p1: RateCell::new(None, table, market_data_loaded),
            fuse_p2: RateCell::new(None, table, market_data_loaded),
        })
        .collect()
}

fn width(s: &str) -> usize {
    s.chars().count()
}

fn push_line(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let mut line = String::new();
    for (i, (cell, w)) in cells.iter().zip(widths).enumerate() {
        let pad = w.saturating_sub(width(cell));
        if i == 0 {
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
        } else {
            // Rate columns are centered.
            line.push_str("  ");
            line.push_str(&" ".repeat(pad / 2));
            line.push_str(cell);
            line.push_str(&" ".repeat(pad - pad / 2));
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Renders the whole dashboard as text.
pub fn render(
    state: &ViewState,
    tokens: &[TokenEntry],
    aave: &MarketSnapshot,
    compound: &MarketSnapshot,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Interest Rates | {} | updated {}\n",
        state.table.label(),
        now.format("%H:%M:%S UTC")
    ));
    if !state.search.is_empty() {
        out.push_str(&format!("Search: \"{}\" ({})\n", state.search, state.mode));
    }
    out.push('\n');

    if aave.is_none() {
        out.push_str(&format!("Loading interest rates {}\n", LOADING));
        return out;
    }

    let visible = filter_tokens(&state.search, tokens, state.mode);
    let rows = build_rows(&visible, aave, compound, state.table);

    let header = HEADERS.map(|h| h.to_string());
    let body: Vec<[String; 5]> = rows.iter().map(|row| row.cells()).collect();

    let mut widths = [0usize; 5];
    for cells in std::iter::once(&header).chain(body.iter()) {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(width(cell));
        }
    }

    push_line(&mut out, &header, &widths);
    let rule_len = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');
    for cells in &body {
        push_line(&mut out, cells, &widths);
    }

    if body.is_empty() {
        if state.search.is_empty() {
            out.push_str("No assets yet.\n");
        } else {
            out.push_str(&format!("No assets match \"{}\".\n", state.search));
        }
    }

    out
}
