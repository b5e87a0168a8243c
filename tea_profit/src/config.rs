//! Application configuration and slider declarations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TeaError;

pub const DEFAULT_DATA_PATH: &str = "data/model_results.csv";

/// Page framing of the dashboard.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStyle {
    /// Heading and chart each sit in a bordered card.
    #[default]
    Cards,
    /// Unframed single column.
    Plain,
}

impl LayoutStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutStyle::Cards => "cards",
            LayoutStyle::Plain => "plain",
        }
    }

    pub fn container_class(&self) -> &'static str {
        match self {
            LayoutStyle::Cards => "container layout-cards",
            LayoutStyle::Plain => "container layout-plain",
        }
    }

    pub fn section_class(&self) -> &'static str {
        match self {
            LayoutStyle::Cards => "card",
            LayoutStyle::Plain => "section",
        }
    }

    /// (top, left/right) figure margins in pixels.
    pub fn figure_margins(&self) -> (u32, u32) {
        match self {
            LayoutStyle::Cards => (60, 70),
            LayoutStyle::Plain => (40, 40),
        }
    }

    /// Raster/vector canvas size for offline renders.
    pub fn canvas_size(&self) -> (u32, u32) {
        match self {
            LayoutStyle::Cards => (1100, 640),
            LayoutStyle::Plain => (960, 560),
        }
    }
}

impl FromStr for LayoutStyle {
    type Err = TeaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cards" | "card" => Ok(LayoutStyle::Cards),
            "plain" => Ok(LayoutStyle::Plain),
            other => Err(TeaError::InvalidConfig(format!(
                "unknown layout style '{other}' (expected cards|plain)"
            ))),
        }
    }
}

/// Settings that distinguish one deployment of the dashboard from another.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub debug: bool,
    pub layout_style: LayoutStyle,
    /// File path for the CLI, URL for the web front end.
    pub data_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            layout_style: LayoutStyle::Cards,
            data_path: DEFAULT_DATA_PATH.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> Result<Self, TeaError> {
        serde_json::from_str(text).map_err(|e| TeaError::InvalidConfig(e.to_string()))
    }

    /// Overlay `debug`, `layout` and `data` from a URL query string such as
    /// `?debug=1&layout=plain`. Unknown keys are ignored.
    pub fn apply_query(&mut self, query: &str) -> Result<(), TeaError> {
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "debug" => {
                    self.debug = matches!(value, "" | "1" | "true" | "yes" | "on");
                }
                "layout" => self.layout_style = value.parse()?,
                "data" if !value.is_empty() => self.data_path = value.to_string(),
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParamKind {
    ProductValue,
    ACost,
    BCost,
}

impl ParamKind {
    pub fn slider(&self) -> &'static SliderSpec {
        match self {
            ParamKind::ProductValue => &PRODUCT_VALUE_SLIDER,
            ParamKind::ACost => &A_COST_SLIDER,
            ParamKind::BCost => &B_COST_SLIDER,
        }
    }
}

/// A range-constrained numeric input of the dashboard.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct SliderSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: ParamKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub initial: f64,
}

impl SliderSpec {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const PRODUCT_VALUE_SLIDER: SliderSpec = SliderSpec {
    id: "prod-val",
    label: "Product ($/g):",
    kind: ParamKind::ProductValue,
    min: 0.5,
    max: 50.0,
    step: 0.5,
    initial: 25.0,
};

pub const A_COST_SLIDER: SliderSpec = SliderSpec {
    id: "add1-cost",
    label: "Additive A Cost ($/g):",
    kind: ParamKind::ACost,
    min: 0.25,
    max: 25.0,
    step: 0.25,
    initial: 2.5,
};

pub const B_COST_SLIDER: SliderSpec = SliderSpec {
    id: "add2-cost",
    label: "Additive B Cost ($/g):",
    kind: ParamKind::BCost,
    min: 0.25,
    max: 25.0,
    step: 0.25,
    initial: 2.5,
};

pub const SLIDERS: [SliderSpec; 3] = [PRODUCT_VALUE_SLIDER, A_COST_SLIDER, B_COST_SLIDER];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProfitParams;

    #[test]
    fn config_json_fills_missing_fields() {
        let cfg = AppConfig::from_json_str(r#"{"debug": true}"#).unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.layout_style, LayoutStyle::Cards);
        assert_eq!(cfg.data_path, DEFAULT_DATA_PATH);

        let cfg = AppConfig::from_json_str(r#"{"layout_style": "plain"}"#).unwrap();
        assert_eq!(cfg.layout_style, LayoutStyle::Plain);
        assert!(!cfg.debug);
    }

    #[test]
    fn config_json_rejects_unknown_layout() {
        let err = AppConfig::from_json_str(r#"{"layout_style": "fancy"}"#).unwrap_err();
        assert!(matches!(err, TeaError::InvalidConfig(_)));
    }

    #[test]
    fn query_string_overrides() {
        let mut cfg = AppConfig::default();
        cfg.apply_query("?debug=1&layout=plain&data=other.csv&x=y").unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.layout_style, LayoutStyle::Plain);
        assert_eq!(cfg.data_path, "other.csv");

        cfg.apply_query("debug=0").unwrap();
        assert!(!cfg.debug);
        assert!(cfg.apply_query("layout=wide").is_err());
    }

    #[test]
    fn empty_query_is_a_no_op() {
        let mut cfg = AppConfig::default();
        cfg.apply_query("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn slider_initials_are_the_ui_defaults() {
        let params = SLIDERS
            .iter()
            .fold(ProfitParams::default(), |p, s| p.with(s.kind, s.initial));
        assert_eq!(params, ProfitParams::ui_initial());
        for slider in SLIDERS {
            assert!(slider.contains(slider.initial));
            assert_eq!(slider.kind.slider().id, slider.id);
        }
    }

    #[test]
    fn slider_bounds_match_dashboard() {
        assert_eq!((PRODUCT_VALUE_SLIDER.min, PRODUCT_VALUE_SLIDER.max), (0.5, 50.0));
        assert_eq!((A_COST_SLIDER.min, A_COST_SLIDER.max), (0.25, 25.0));
        assert_eq!((B_COST_SLIDER.min, B_COST_SLIDER.max), (0.25, 25.0));
        assert!(!A_COST_SLIDER.contains(0.1));
    }
}
