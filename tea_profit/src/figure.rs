//! Renderable grid and the heatmap figure description built from it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::LayoutStyle;
use crate::ProfitTable;

pub const FIGURE_TITLE: &str = "How do Additive Concentrations Affect Potential Profit?";
pub const COLORBAR_TITLE: &str = "Estimated Profit/kg broth";
pub const TICK_PREFIX: &str = "US$";
pub const X_AXIS_TITLE: &str = "Concentration B";
pub const Y_AXIS_TITLE: &str = "Concentration A";
pub const FIGURE_HEIGHT: u32 = 500;

/// Colour-scale bounds for profit, $/kg broth.
pub const DISPLAY_RANGE: DisplayRange = DisplayRange {
    min: 0.0,
    max: 5000.0,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

impl DisplayRange {
    /// Saturates `value` into the range. NaN stays NaN so it renders as a gap.
    pub fn saturate(&self, value: f64) -> f64 {
        if value.is_nan() {
            value
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Position of `value` on the colour scale, in [0, 1].
    pub fn fraction(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 || value.is_nan() {
            return 0.0;
        }
        (self.saturate(value) - self.min) / span
    }
}

/// Scattered heatmap samples: one `(x, y, z)` triple per table row.
///
/// `x` is Concentration B, `y` is Concentration A, `z` is Estimated Profit.
/// `z` keeps the raw values; saturation to `range` happens only at display time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeatmapGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub range: DisplayRange,
}

impl HeatmapGrid {
    pub fn from_table(table: &ProfitTable) -> Self {
        let mut x = Vec::with_capacity(table.rows.len());
        let mut y = Vec::with_capacity(table.rows.len());
        let mut z = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            x.push(row.concentration_b);
            y.push(row.concentration_a);
            z.push(row.estimated_profit);
        }
        Self {
            x,
            y,
            z,
            range: DISPLAY_RANGE,
        }
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn display_z(&self) -> Vec<f64> {
        self.z.iter().map(|&v| self.range.saturate(v)).collect()
    }

    /// Pivot the samples onto the rectangular lattice of distinct `x`/`y` values.
    ///
    /// Cells with no sample are `None`. When two rows share a coordinate the
    /// later row wins, matching how a heatmap trace resolves duplicates.
    /// Samples with a NaN coordinate are dropped from the lattice.
    pub fn to_dense(&self) -> DenseGrid {
        let x_axis = distinct_sorted(&self.x);
        let y_axis = distinct_sorted(&self.y);
        let mut cells = vec![vec![None; x_axis.len()]; y_axis.len()];
        for ((&x, &y), &z) in self.x.iter().zip(&self.y).zip(&self.z) {
            let (Ok(ix), Ok(iy)) = (
                x_axis.binary_search_by(|v| v.total_cmp(&x)),
                y_axis.binary_search_by(|v| v.total_cmp(&y)),
            ) else {
                continue;
            };
            cells[iy][ix] = Some(z);
        }
        DenseGrid {
            x_axis,
            y_axis,
            cells,
        }
    }
}

/// Row-major lattice: `cells[iy][ix]` sits at `(x_axis[ix], y_axis[iy])`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DenseGrid {
    pub x_axis: Vec<f64>,
    pub y_axis: Vec<f64>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl DenseGrid {
    /// Cell boundaries along an axis, half way between neighbouring values.
    pub fn edges(axis: &[f64]) -> Vec<f64> {
        match axis.len() {
            0 => Vec::new(),
            1 => vec![axis[0] - 0.5, axis[0] + 0.5],
            n => {
                let mut edges = Vec::with_capacity(n + 1);
                edges.push(axis[0] - (axis[1] - axis[0]) / 2.0);
                for pair in axis.windows(2) {
                    edges.push((pair[0] + pair[1]) / 2.0);
                }
                edges.push(axis[n - 1] + (axis[n - 1] - axis[n - 2]) / 2.0);
                edges
            }
        }
    }
}

fn distinct_sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup_by(|a, b| a.total_cmp(b).is_eq());
    out
}

/// Plotly figure (`{"data": [...], "layout": {...}}`) for the profit heatmap.
///
/// Non-finite `z` values serialize as `null` and render as gaps.
pub fn plotly_figure(grid: &HeatmapGrid, style: LayoutStyle) -> JsonValue {
    let (margin_t, margin_side) = style.figure_margins();
    json!({
        "data": [{
            "type": "heatmap",
            "z": grid.z,
            "x": grid.x,
            "y": grid.y,
            "zmin": grid.range.min,
            "zmax": grid.range.max,
            "colorbar": {
                "title": { "text": COLORBAR_TITLE },
                "tickprefix": TICK_PREFIX,
            },
            "hovertemplate": "B %{x} g/kg<br>A %{y} g/kg<br>Profit US$%{z:.2f}<extra></extra>",
        }],
        "layout": {
            "title": { "text": FIGURE_TITLE },
            "height": FIGURE_HEIGHT,
            "xaxis": { "title": { "text": X_AXIS_TITLE } },
            "yaxis": { "title": { "text": Y_AXIS_TITLE } },
            "paper_bgcolor": "white",
            "plot_bgcolor": "white",
            "margin": { "t": margin_t, "l": margin_side, "r": margin_side },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_table;
    use crate::{recompute_profit, ProfitParams};

    fn grid(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> HeatmapGrid {
        HeatmapGrid {
            x,
            y,
            z,
            range: DISPLAY_RANGE,
        }
    }

    #[test]
    fn saturates_without_discarding() {
        let g = grid(
            vec![0.0, 1.0, 2.0],
            vec![0.0, 0.0, 0.0],
            vec![-50.0, 2500.0, 9000.0],
        );
        assert_eq!(g.display_z(), vec![0.0, 2500.0, 5000.0]);
        assert_eq!(g.z, vec![-50.0, 2500.0, 9000.0]);
        assert_eq!(g.range.fraction(2500.0), 0.5);
        assert_eq!(g.range.fraction(-1.0), 0.0);
        assert_eq!(g.range.fraction(1e9), 1.0);
    }

    #[test]
    fn dense_pivot_places_cells_and_leaves_holes() {
        let g = grid(
            vec![0.0, 10.0, 0.0],
            vec![5.0, 5.0, 15.0],
            vec![1.0, 2.0, 3.0],
        );
        let dense = g.to_dense();
        assert_eq!(dense.x_axis, vec![0.0, 10.0]);
        assert_eq!(dense.y_axis, vec![5.0, 15.0]);
        assert_eq!(dense.cells[0], vec![Some(1.0), Some(2.0)]);
        assert_eq!(dense.cells[1], vec![Some(3.0), None]);
    }

    #[test]
    fn dense_pivot_later_duplicate_wins() {
        let g = grid(vec![1.0, 1.0], vec![2.0, 2.0], vec![10.0, 20.0]);
        assert_eq!(g.to_dense().cells, vec![vec![Some(20.0)]]);
    }

    #[test]
    fn edges_bracket_axis_values() {
        assert_eq!(DenseGrid::edges(&[0.0, 10.0, 20.0]), vec![-5.0, 5.0, 15.0, 25.0]);
        assert_eq!(DenseGrid::edges(&[3.0]), vec![2.5, 3.5]);
        assert!(DenseGrid::edges(&[]).is_empty());
    }

    #[test]
    fn plotly_figure_carries_fixed_range_and_labels() {
        let table = recompute_profit(&sample_table(), &ProfitParams::ui_initial());
        let fig = plotly_figure(&table.grid(), LayoutStyle::Cards);
        let trace = &fig["data"][0];
        assert_eq!(trace["type"], "heatmap");
        assert_eq!(trace["zmin"], 0.0);
        assert_eq!(trace["zmax"], 5000.0);
        assert_eq!(trace["colorbar"]["title"]["text"], COLORBAR_TITLE);
        assert_eq!(trace["colorbar"]["tickprefix"], "US$");
        assert_eq!(trace["x"].as_array().map(Vec::len), Some(4));
        assert_eq!(trace["x"][0], 20.0);
        assert_eq!(trace["y"][0], 10.0);
        assert_eq!(fig["layout"]["height"], 500);
        assert_eq!(fig["layout"]["xaxis"]["title"]["text"], "Concentration B");
        assert_eq!(fig["layout"]["yaxis"]["title"]["text"], "Concentration A");
    }

    #[test]
    fn nan_profit_serializes_as_null() {
        let g = grid(vec![0.0], vec![0.0], vec![f64::NAN]);
        let fig = plotly_figure(&g, LayoutStyle::Plain);
        assert!(fig["data"][0]["z"][0].is_null());
    }
}
