//! Techno-economic profit recomputation over a table of precomputed yield predictions.

use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod figure;
pub mod table;

pub use config::{AppConfig, LayoutStyle, ParamKind, SliderSpec, SLIDERS};
pub use figure::{plotly_figure, DenseGrid, DisplayRange, HeatmapGrid, DISPLAY_RANGE};
pub use table::{InputRecord, InputTable, REQUIRED_COLUMNS};

#[derive(Error, Debug)]
pub enum TeaError {
    #[error("input table is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("row {row}: column '{column}' is not numeric ('{value}')")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Glucose feed assumed for every condition, g/kg.
pub const GLUCOSE_CONCENTRATION_G_PER_KG: f64 = 100.0;

pub const PRODUCT_CONCENTRATION: &str = "Product Concentration";
pub const PRODUCT_VALUE: &str = "Product Value";
pub const ADDITIVE_A_COST: &str = "Additive A Cost";
pub const ADDITIVE_B_COST: &str = "Additive B Cost";
pub const ESTIMATED_PROFIT: &str = "Estimated Profit";

/// The three economic inputs of the profit formula.
///
/// Two default sets are kept separate:
/// [`ProfitParams::default`] is what a bare recomputation uses (25, 1, 0.5),
/// while [`ProfitParams::ui_initial`] is what the sliders start at (25, 2.5, 2.5).
/// Values are never range-checked; the slider bounds only constrain the UI.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfitParams {
    /// Product price, $/g.
    pub product_value: f64,
    /// Additive A price, $/g.
    pub a_cost: f64,
    /// Additive B price, $/g.
    pub b_cost: f64,
}

impl ProfitParams {
    pub const FUNCTION_DEFAULT: ProfitParams = ProfitParams {
        product_value: 25.0,
        a_cost: 1.0,
        b_cost: 0.5,
    };

    pub const fn new(product_value: f64, a_cost: f64, b_cost: f64) -> Self {
        Self {
            product_value,
            a_cost,
            b_cost,
        }
    }

    /// Parameters matching the initial slider positions.
    pub fn ui_initial() -> Self {
        Self {
            product_value: config::PRODUCT_VALUE_SLIDER.initial,
            a_cost: config::A_COST_SLIDER.initial,
            b_cost: config::B_COST_SLIDER.initial,
        }
    }

    pub fn get(&self, kind: ParamKind) -> f64 {
        match kind {
            ParamKind::ProductValue => self.product_value,
            ParamKind::ACost => self.a_cost,
            ParamKind::BCost => self.b_cost,
        }
    }

    pub fn with(mut self, kind: ParamKind, value: f64) -> Self {
        match kind {
            ParamKind::ProductValue => self.product_value = value,
            ParamKind::ACost => self.a_cost = value,
            ParamKind::BCost => self.b_cost = value,
        }
        self
    }
}

impl Default for ProfitParams {
    fn default() -> Self {
        Self::FUNCTION_DEFAULT
    }
}

/// One input row together with its derived economic fields.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfitRow {
    #[serde(rename = "Yield")]
    pub yield_fraction: f64,
    #[serde(rename = "Concentration A")]
    pub concentration_a: f64,
    #[serde(rename = "Concentration B")]
    pub concentration_b: f64,
    /// g/kg
    #[serde(rename = "Product Concentration")]
    pub product_concentration: f64,
    /// $/kg
    #[serde(rename = "Product Value")]
    pub product_value: f64,
    #[serde(rename = "Additive A Cost")]
    pub additive_a_cost: f64,
    #[serde(rename = "Additive B Cost")]
    pub additive_b_cost: f64,
    /// $/kg broth
    #[serde(rename = "Estimated Profit")]
    pub estimated_profit: f64,
}

impl ProfitRow {
    pub fn compute(record: &InputRecord, params: &ProfitParams) -> Self {
        let product_concentration = record.yield_fraction * GLUCOSE_CONCENTRATION_G_PER_KG;
        let product_value = product_concentration * params.product_value;
        let additive_a_cost = record.concentration_a * params.a_cost;
        let additive_b_cost = record.concentration_b * params.b_cost;
        let estimated_profit = product_value - additive_a_cost - additive_b_cost;
        Self {
            yield_fraction: record.yield_fraction,
            concentration_a: record.concentration_a,
            concentration_b: record.concentration_b,
            product_concentration,
            product_value,
            additive_a_cost,
            additive_b_cost,
            estimated_profit,
        }
    }
}

/// Input table augmented with derived fields for one parameter set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfitTable {
    pub params: ProfitParams,
    pub rows: Vec<ProfitRow>,
}

impl ProfitTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn grid(&self) -> HeatmapGrid {
        HeatmapGrid::from_table(self)
    }

    pub fn summary(&self) -> ProfitSummary {
        ProfitSummary::from_table(self)
    }

    /// Writes the augmented table as CSV with the domain column names as header.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), TeaError> {
        let mut writer = csv::Writer::from_writer(out);
        for row in &self.rows {
            writer.serialize(row)?;
        }
        if self.rows.is_empty() {
            writer.write_record(csv_header())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, TeaError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn csv_header() -> [&'static str; 8] {
    [
        table::YIELD,
        table::CONCENTRATION_A,
        table::CONCENTRATION_B,
        PRODUCT_CONCENTRATION,
        PRODUCT_VALUE,
        ADDITIVE_A_COST,
        ADDITIVE_B_COST,
        ESTIMATED_PROFIT,
    ]
}

/// Result of one recomputation: the augmented table and the grid derived from it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfitOutput {
    pub table: ProfitTable,
    pub grid: HeatmapGrid,
}

/// Applies the profit formula to every row of `input`.
///
/// The input is only read. Each call builds a fresh table, so calls with the
/// same arguments give bitwise-identical results regardless of what ran before.
pub fn recompute_profit(input: &InputTable, params: &ProfitParams) -> ProfitTable {
    let rows = input
        .records()
        .iter()
        .map(|record| ProfitRow::compute(record, params))
        .collect();
    ProfitTable {
        params: *params,
        rows,
    }
}

/// Recomputes the table and builds the renderable grid in one step.
pub fn recompute(input: &InputTable, params: &ProfitParams) -> ProfitOutput {
    let table = recompute_profit(input, params);
    let grid = table.grid();
    ProfitOutput { table, grid }
}

/// Aggregate view over a [`ProfitTable`], used for log lines and the debug panel.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfitSummary {
    pub rows: usize,
    pub min_profit: Option<f64>,
    pub max_profit: Option<f64>,
    pub mean_profit: Option<f64>,
    pub profitable_rows: usize,
    /// Rows drawn at the low end of the colour scale.
    pub below_range: usize,
    /// Rows drawn at the high end of the colour scale.
    pub above_range: usize,
}

impl ProfitSummary {
    pub fn from_table(table: &ProfitTable) -> Self {
        let mut summary = ProfitSummary {
            rows: table.rows.len(),
            ..Default::default()
        };
        let mut sum = 0.0;
        let mut finite = 0usize;
        for row in &table.rows {
            let profit = row.estimated_profit;
            if !profit.is_finite() {
                continue;
            }
            finite += 1;
            sum += profit;
            summary.min_profit = Some(summary.min_profit.map_or(profit, |m| m.min(profit)));
            summary.max_profit = Some(summary.max_profit.map_or(profit, |m| m.max(profit)));
            if profit > 0.0 {
                summary.profitable_rows += 1;
            }
            if profit < DISPLAY_RANGE.min {
                summary.below_range += 1;
            } else if profit > DISPLAY_RANGE.max {
                summary.above_range += 1;
            }
        }
        if finite > 0 {
            summary.mean_profit = Some(sum / finite as f64);
        }
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_table() -> InputTable {
        InputTable::new(vec![
            InputRecord::new(0.5, 10.0, 20.0),
            InputRecord::new(0.0, 0.0, 0.0),
            InputRecord::new(0.9, 5.0, 40.0),
            InputRecord::new(0.1, 50.0, 52.0),
        ])
    }

    fn bits(table: &ProfitTable) -> Vec<[u64; 8]> {
        table
            .rows
            .iter()
            .map(|r| {
                [
                    r.yield_fraction.to_bits(),
                    r.concentration_a.to_bits(),
                    r.concentration_b.to_bits(),
                    r.product_concentration.to_bits(),
                    r.product_value.to_bits(),
                    r.additive_a_cost.to_bits(),
                    r.additive_b_cost.to_bits(),
                    r.estimated_profit.to_bits(),
                ]
            })
            .collect()
    }

    #[test]
    fn worked_example_matches_formula() {
        let input = InputTable::new(vec![InputRecord::new(0.5, 10.0, 20.0)]);
        let table = recompute_profit(&input, &ProfitParams::new(25.0, 2.5, 2.5));
        let row = table.rows[0];
        assert_eq!(row.product_concentration, 50.0);
        assert_eq!(row.product_value, 1250.0);
        assert_eq!(row.additive_a_cost, 25.0);
        assert_eq!(row.additive_b_cost, 50.0);
        assert_eq!(row.estimated_profit, 1175.0);
    }

    #[test]
    fn zero_row_has_zero_profit_for_any_params() {
        let input = InputTable::new(vec![InputRecord::new(0.0, 0.0, 0.0)]);
        for params in [
            ProfitParams::default(),
            ProfitParams::ui_initial(),
            ProfitParams::new(50.0, 25.0, 0.25),
            ProfitParams::new(-3.0, 1e6, -7.5),
        ] {
            let table = recompute_profit(&input, &params);
            assert_eq!(table.rows[0].estimated_profit, 0.0);
        }
    }

    #[test]
    fn profit_formula_holds_for_every_row() {
        let input = sample_table();
        let params = ProfitParams::new(12.0, 3.25, 0.75);
        let table = recompute_profit(&input, &params);
        assert_eq!(table.len(), input.len());
        for (record, row) in input.records().iter().zip(&table.rows) {
            let expected = record.yield_fraction * 100.0 * params.product_value
                - record.concentration_a * params.a_cost
                - record.concentration_b * params.b_cost;
            assert!((row.estimated_profit - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn repeated_calls_are_bitwise_identical() {
        let input = sample_table();
        let params = ProfitParams::ui_initial();
        let first = recompute_profit(&input, &params);
        let second = recompute_profit(&input, &params);
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn no_state_leaks_between_calls() {
        let input = sample_table();
        let p1 = ProfitParams::new(25.0, 2.5, 2.5);
        let p2 = ProfitParams::new(0.5, 25.0, 0.25);
        let before = recompute_profit(&input, &p1);
        let _ = recompute_profit(&input, &p2);
        let after = recompute_profit(&input, &p1);
        assert_eq!(bits(&before), bits(&after));
        assert_eq!(input, sample_table());
    }

    #[test]
    fn profit_increases_with_product_value() {
        let input = sample_table();
        let low = recompute_profit(&input, &ProfitParams::new(10.0, 2.5, 2.5));
        let high = recompute_profit(&input, &ProfitParams::new(10.5, 2.5, 2.5));
        for (l, h) in low.rows.iter().zip(&high.rows) {
            if l.yield_fraction > 0.0 {
                assert!(h.estimated_profit > l.estimated_profit);
            } else {
                assert_eq!(h.estimated_profit, l.estimated_profit);
            }
        }
    }

    #[test]
    fn out_of_range_params_yield_negative_profit() {
        let input = InputTable::new(vec![InputRecord::new(0.1, 50.0, 50.0)]);
        let table = recompute_profit(&input, &ProfitParams::new(0.0, 100.0, 100.0));
        assert_eq!(table.rows[0].estimated_profit, -10_000.0);
    }

    #[test]
    fn default_sets_stay_distinct() {
        let function = ProfitParams::default();
        let ui = ProfitParams::ui_initial();
        assert_eq!(function, ProfitParams::new(25.0, 1.0, 0.5));
        assert_eq!(ui, ProfitParams::new(25.0, 2.5, 2.5));
    }

    #[test]
    fn recompute_grid_tracks_rows() {
        let input = sample_table();
        let out = recompute(&input, &ProfitParams::default());
        assert_eq!(out.grid.x.len(), input.len());
        assert_eq!(out.grid.y.len(), input.len());
        assert_eq!(out.grid.z.len(), input.len());
        assert_eq!(out.grid.x[0], 20.0);
        assert_eq!(out.grid.y[0], 10.0);
        assert_eq!(out.grid.z[0], out.table.rows[0].estimated_profit);
    }

    #[test]
    fn summary_counts_profitable_and_saturated_rows() {
        let input = sample_table();
        let table = recompute_profit(&input, &ProfitParams::new(25.0, 2.5, 2.5));
        // profits: 1175, 0, 2137.5, -5
        let summary = table.summary();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.profitable_rows, 2);
        assert_eq!(summary.below_range, 1);
        assert_eq!(summary.above_range, 0);
        assert_eq!(summary.min_profit, Some(-5.0));
        assert_eq!(summary.max_profit, Some(2137.5));
        assert_eq!(summary.mean_profit, Some((1175.0 + 0.0 + 2137.5 - 5.0) / 4.0));
    }

    #[test]
    fn csv_export_uses_domain_headers() {
        let input = InputTable::new(vec![InputRecord::new(0.5, 10.0, 20.0)]);
        let table = recompute_profit(&input, &ProfitParams::new(25.0, 2.5, 2.5));
        let text = table.to_csv_string().unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Yield,Concentration A,Concentration B,Product Concentration,Product Value,Additive A Cost,Additive B Cost,Estimated Profit"
        );
        assert_eq!(lines.next().unwrap(), "0.5,10.0,20.0,50.0,1250.0,25.0,50.0,1175.0");
    }

    #[test]
    fn csv_export_of_empty_table_keeps_header() {
        let table = recompute_profit(&InputTable::default(), &ProfitParams::default());
        let text = table.to_csv_string().unwrap();
        assert!(text.starts_with("Yield,Concentration A"));
    }
}
