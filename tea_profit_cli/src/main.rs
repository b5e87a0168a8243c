use std::fs;
use std::fs::File;
use std::io::{self, BufWriter};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tea_profit::figure::{COLORBAR_TITLE, FIGURE_TITLE, TICK_PREFIX, X_AXIS_TITLE, Y_AXIS_TITLE};
use tea_profit::{
    plotly_figure, recompute, AppConfig, DenseGrid, HeatmapGrid, InputTable, LayoutStyle,
    ProfitParams, ProfitSummary, SLIDERS,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive techno-economic analysis CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute profit for one parameter set and write CSV/plots
    Heatmap(HeatmapArgs),
    /// Log the profit summary for one parameter set
    Summary(SummaryArgs),
    /// List the dashboard sliders with bounds and initial values
    Sliders,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Model results CSV (columns Yield, Concentration A, Concentration B)
    #[arg(long, value_hint = ValueHint::FilePath)]
    data: Option<PathBuf>,

    /// JSON config file (debug, layout_style, data_path)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Product value ($/g)
    #[arg(long, allow_negative_numbers = true)]
    product_value: Option<f64>,

    /// Additive A cost ($/g)
    #[arg(long, allow_negative_numbers = true)]
    a_cost: Option<f64>,

    /// Additive B cost ($/g)
    #[arg(long, allow_negative_numbers = true)]
    b_cost: Option<f64>,

    /// Start from the slider initial values instead of the function defaults
    #[arg(long, action = ArgAction::SetTrue)]
    ui_defaults: bool,

    /// Debug mode (debug-level logging, parameter range warnings)
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct HeatmapArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "profit.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output PNG figure path (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Output Plotly figure JSON path
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Figure layout style
    #[arg(long, value_enum)]
    layout: Option<LayoutOpt>,

    /// Profile major stages with timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LayoutOpt {
    Cards,
    Plain,
}

impl From<LayoutOpt> for LayoutStyle {
    fn from(value: LayoutOpt) -> Self {
        match value {
            LayoutOpt::Cards => LayoutStyle::Cards,
            LayoutOpt::Plain => LayoutStyle::Plain,
        }
    }
}

impl CommonArgs {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match self.config.as_ref() {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                AppConfig::from_json_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => AppConfig::default(),
        };
        if self.debug {
            config.debug = true;
        }
        if let Some(data) = self.data.as_ref() {
            config.data_path = data.to_string_lossy().into_owned();
        }
        Ok(config)
    }

    fn params(&self) -> ProfitParams {
        let mut params = if self.ui_defaults {
            ProfitParams::ui_initial()
        } else {
            ProfitParams::default()
        };
        if let Some(v) = self.product_value {
            params.product_value = v;
        }
        if let Some(v) = self.a_cost {
            params.a_cost = v;
        }
        if let Some(v) = self.b_cost {
            params.b_cost = v;
        }
        params
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Heatmap(args) => {
            let config = args.common.load_config()?;
            init_tracing(args.common.verbose || config.debug);
            handle_heatmap(args, config)
        }
        Command::Summary(args) => {
            let config = args.common.load_config()?;
            init_tracing(args.common.verbose || config.debug);
            handle_summary(args, config)
        }
        Command::Sliders => {
            init_tracing(false);
            handle_sliders()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_table(config: &AppConfig) -> Result<InputTable> {
    let path = Path::new(&config.data_path);
    let t_load = Instant::now();
    let table = InputTable::load(path)
        .with_context(|| format!("failed to load model results {}", path.display()))?;
    debug!(
        "Load stage: {:.1} ms ({} rows)",
        t_load.elapsed().as_secs_f64() * 1000.0,
        table.len()
    );
    if table.is_empty() {
        warn!("{} has no data rows", path.display());
    }
    Ok(table)
}

fn warn_out_of_range(params: &ProfitParams) {
    for slider in SLIDERS {
        let value = params.get(slider.kind);
        if !slider.contains(value) {
            warn!(
                "{} = {} is outside the dashboard range [{}, {}]",
                slider.id, value, slider.min, slider.max
            );
        }
    }
}

fn handle_heatmap(args: HeatmapArgs, mut config: AppConfig) -> Result<()> {
    if let Some(layout) = args.layout {
        config.layout_style = layout.into();
    }
    let verbose = args.common.verbose || config.debug;
    let params = args.common.params();
    if config.debug {
        warn_out_of_range(&params);
    }

    let input = load_table(&config)?;

    let t_compute = Instant::now();
    let output = recompute(&input, &params);
    if args.profile || verbose {
        info!(
            "Compute stage: {:.3} ms ({} rows)",
            t_compute.elapsed().as_secs_f64() * 1000.0,
            output.table.len()
        );
    }
    log_summary(&params, &output.table.summary());

    if args.output.as_os_str() == "-" {
        output.table.write_csv(io::stdout().lock())?;
    } else {
        let t_csv = Instant::now();
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        output
            .table
            .write_csv(BufWriter::new(file))
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        if args.profile || verbose {
            info!(
                "CSV stage: {:.1} ms ({} rows)",
                t_csv.elapsed().as_secs_f64() * 1000.0,
                output.table.len()
            );
        }
        info!("Wrote profit CSV: {}", args.output.display());
    }

    if let Some(path) = args.json.as_ref() {
        let figure = plotly_figure(&output.grid, config.layout_style);
        let text = serde_json::to_string_pretty(&figure)?;
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote figure JSON: {}", path.display());
    }

    if args.no_plot {
        return Ok(());
    }

    let png_path = match args.png.as_ref() {
        Some(path) => Some(path.clone()),
        None if args.output.as_os_str() != "-" => {
            let mut path = args.output.clone();
            path.set_extension("png");
            Some(path)
        }
        None => None,
    };

    if let Some(path) = png_path {
        let t_plot = Instant::now();
        match render_chart_guard(&output.grid, &path, ChartKind::Png, config.layout_style) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping PNG render ({}): {}", path.display(), err),
        }
        if args.profile || verbose {
            info!(
                "Plot stage: {:.1} ms",
                t_plot.elapsed().as_secs_f64() * 1000.0
            );
        }
    }

    if let Some(path) = args.svg.as_ref() {
        match render_chart_guard(&output.grid, path, ChartKind::Svg, config.layout_style) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping SVG render ({}): {}", path.display(), err),
        }
    }

    Ok(())
}

fn handle_summary(args: SummaryArgs, config: AppConfig) -> Result<()> {
    let params = args.common.params();
    if config.debug {
        warn_out_of_range(&params);
    }
    let input = load_table(&config)?;
    let table = tea_profit::recompute_profit(&input, &params);
    log_summary(&params, &table.summary());
    Ok(())
}

fn handle_sliders() -> Result<()> {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    writer.write_record(["id", "label", "min", "max", "step", "initial"])?;
    for slider in SLIDERS {
        writer.write_record([
            slider.id.to_string(),
            slider.label.to_string(),
            slider.min.to_string(),
            slider.max.to_string(),
            slider.step.to_string(),
            slider.initial.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn log_summary(params: &ProfitParams, summary: &ProfitSummary) {
    info!(
        "Profit recomputed: {} rows at product {} $/g, A {} $/g, B {} $/g",
        summary.rows, params.product_value, params.a_cost, params.b_cost
    );
    match (summary.min_profit, summary.max_profit, summary.mean_profit) {
        (Some(min), Some(max), Some(mean)) => info!(
            "Estimated profit/kg broth: min {}{:.2}, max {}{:.2}, mean {}{:.2}; {} profitable rows",
            TICK_PREFIX, min, TICK_PREFIX, max, TICK_PREFIX, mean, summary.profitable_rows
        ),
        _ => warn!("No finite profit values to summarize"),
    }
    if summary.below_range > 0 || summary.above_range > 0 {
        debug!(
            "Saturated on colour scale: {} below, {} above",
            summary.below_range, summary.above_range
        );
    }
}

enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(
    grid: &HeatmapGrid,
    path: &Path,
    kind: ChartKind,
    style: LayoutStyle,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        if grid.is_empty() {
            return Err("no rows to plot".to_string());
        }
        let size = style.canvas_size();
        let result = match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, size).into_drawing_area();
                draw_heatmap(root, grid, style)
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, size).into_drawing_area();
                draw_heatmap(root, grid, style)
            }
        };
        result.map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

const COLORBAR_WIDTH: u32 = 150;

fn draw_heatmap<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    grid: &HeatmapGrid,
    style: LayoutStyle,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (margin_top, margin_side) = style.figure_margins();
    let root = root.titled(
        FIGURE_TITLE,
        FontDesc::new(FontFamily::SansSerif, 22.0, FontStyle::Normal),
    )?;
    let (width, _) = root.dim_in_pixel();
    let (plot_area, bar_area) = root.split_horizontally(width.saturating_sub(COLORBAR_WIDTH));

    let dense = grid.to_dense();
    let x_edges = DenseGrid::edges(&dense.x_axis);
    let y_edges = DenseGrid::edges(&dense.y_axis);
    let (x_lo, x_hi) = axis_bounds(&x_edges);
    let (y_lo, y_hi) = axis_bounds(&y_edges);

    let mut chart = ChartBuilder::on(&plot_area)
        .margin_top(margin_top / 3)
        .margin_left(margin_side / 3)
        .margin_right(10)
        .margin_bottom(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(X_AXIS_TITLE)
        .y_desc(Y_AXIS_TITLE)
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            15.0,
            FontStyle::Normal,
        ))
        .draw()?;

    let range = grid.range;
    let mut cells = Vec::new();
    for (iy, row) in dense.cells.iter().enumerate() {
        for (ix, cell) in row.iter().enumerate() {
            let Some(z) = cell.filter(|v| !v.is_nan()) else {
                continue;
            };
            let color = profit_color(range.fraction(z));
            cells.push(Rectangle::new(
                [(x_edges[ix], y_edges[iy]), (x_edges[ix + 1], y_edges[iy + 1])],
                color.filled(),
            ));
        }
    }
    chart.draw_series(cells)?;

    draw_colorbar(&bar_area, range.min, range.max, margin_top)?;
    root.present()?;
    Ok(())
}

fn draw_colorbar<DB>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    min: f64,
    max: f64,
    margin_top: u32,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let mut bar = ChartBuilder::on(area)
        .margin_top(margin_top / 3)
        .margin_bottom(55)
        .margin_right(10)
        .set_label_area_size(LabelAreaPosition::Right, 75)
        .caption(
            COLORBAR_TITLE,
            FontDesc::new(FontFamily::SansSerif, 12.0, FontStyle::Normal),
        )
        .build_cartesian_2d(0.0..1.0, min..max)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_label_formatter(&|v| format!("{}{:.0}", TICK_PREFIX, v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            13.0,
            FontStyle::Normal,
        ))
        .draw()?;

    const STEPS: usize = 100;
    let span = max - min;
    bar.draw_series((0..STEPS).map(|i| {
        let lo = min + span * i as f64 / STEPS as f64;
        let hi = min + span * (i + 1) as f64 / STEPS as f64;
        let color = profit_color((i as f64 + 0.5) / STEPS as f64);
        Rectangle::new([(0.0, lo), (1.0, hi)], color.filled())
    }))?;
    Ok(())
}

fn axis_bounds(edges: &[f64]) -> (f64, f64) {
    match (edges.first(), edges.last()) {
        (Some(&lo), Some(&hi)) if hi > lo => (lo, hi),
        (Some(&lo), _) => (lo - 0.5, lo + 0.5),
        _ => (0.0, 1.0),
    }
}

/// Sequential colour scale stops (plasma), low profit to high.
const PLASMA: [(f64, (u8, u8, u8)); 9] = [
    (0.000, (13, 8, 135)),
    (0.125, (75, 3, 161)),
    (0.250, (125, 3, 168)),
    (0.375, (168, 34, 150)),
    (0.500, (203, 70, 121)),
    (0.625, (229, 107, 93)),
    (0.750, (248, 148, 65)),
    (0.875, (253, 195, 40)),
    (1.000, (240, 249, 33)),
];

fn profit_color(fraction: f64) -> RGBColor {
    let t = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    for pair in PLASMA.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let frac = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
            let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
            return RGBColor(lerp(c0.0, c1.0), lerp(c0.1, c1.1), lerp(c0.2, c1.2));
        }
    }
    let (_, last) = PLASMA[PLASMA.len() - 1];
    RGBColor(last.0, last.1, last.2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heatmap_args_parse_with_negative_costs() {
        let cli = Cli::try_parse_from([
            "tea-profit",
            "heatmap",
            "--data",
            "results.csv",
            "--a-cost",
            "-1.5",
            "--layout",
            "plain",
            "-o",
            "-",
        ])
        .unwrap();
        match cli.command {
            Command::Heatmap(args) => {
                let params = args.common.params();
                assert_eq!(params, ProfitParams::new(25.0, -1.5, 0.5));
                assert!(matches!(args.layout, Some(LayoutOpt::Plain)));
                assert_eq!(args.output, PathBuf::from("-"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ui_defaults_flag_switches_base_params() {
        let cli = Cli::try_parse_from(["tea-profit", "summary", "--ui-defaults", "--b-cost", "4"])
            .unwrap();
        match cli.command {
            Command::Summary(args) => {
                assert_eq!(args.common.params(), ProfitParams::new(25.0, 2.5, 4.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::try_parse_from(["tea-profit", "summary", "--debug", "--data", "x.csv"])
            .unwrap();
        let Command::Summary(args) = cli.command else {
            panic!("expected summary");
        };
        let config = args.common.load_config().unwrap();
        assert!(config.debug);
        assert_eq!(config.data_path, "x.csv");
        assert_eq!(config.layout_style, LayoutStyle::Cards);
    }

    #[test]
    fn colour_scale_endpoints() {
        assert_eq!(profit_color(0.0), RGBColor(13, 8, 135));
        assert_eq!(profit_color(1.0), RGBColor(240, 249, 33));
        assert_eq!(profit_color(-3.0), RGBColor(13, 8, 135));
        assert_eq!(profit_color(f64::NAN), RGBColor(13, 8, 135));
        assert_eq!(profit_color(0.5), RGBColor(203, 70, 121));
    }

    #[test]
    fn axis_bounds_handles_degenerate_edges() {
        assert_eq!(axis_bounds(&[0.0, 10.0]), (0.0, 10.0));
        assert_eq!(axis_bounds(&[]), (0.0, 1.0));
        assert_eq!(axis_bounds(&[2.0, 2.0]), (1.5, 2.5));
    }
}
