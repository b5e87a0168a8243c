use leptos::*;
use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, FileList, HtmlInputElement};

use tea_profit::figure::TICK_PREFIX;
use tea_profit::{
    plotly_figure, recompute, AppConfig, InputTable, ProfitParams, ProfitSummary, SliderSpec,
    SLIDERS,
};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_COMMIT: &str = env!("TEA_COMMIT_HASH");

const PLOT_DIV: &str = "results";

/// Config for this page load: defaults overlaid with the URL query string.
/// A bad query value is reported rather than failing the page.
fn config_from_query(search: &str) -> (AppConfig, Option<String>) {
    let mut config = AppConfig::default();
    match config.apply_query(search) {
        Ok(()) => (config, None),
        Err(err) => (AppConfig::default(), Some(format!("Ignoring URL options: {err}"))),
    }
}

fn describe_summary(summary: &ProfitSummary, compute_ms: f64) -> String {
    let range = match (summary.min_profit, summary.max_profit, summary.mean_profit) {
        (Some(min), Some(max), Some(mean)) => format!(
            "min {TICK_PREFIX}{min:.2} • max {TICK_PREFIX}{max:.2} • mean {TICK_PREFIX}{mean:.2}"
        ),
        _ => "no finite profit values".to_string(),
    };
    format!(
        "{} rows • {} • {} profitable • {} below / {} above colour range • {:.2} ms",
        summary.rows,
        range,
        summary.profitable_rows,
        summary.below_range,
        summary.above_range,
        compute_ms
    )
}

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, String> {
    let window = web_sys::window().ok_or_else(|| "no browser window".to_string())?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|_| format!("Failed to fetch {url}."))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|_| format!("Unexpected response for {url}."))?;
    if !response.ok() {
        return Err(format!("Failed to fetch {url}: HTTP {}.", response.status()));
    }
    let promise = response
        .array_buffer()
        .map_err(|_| format!("Failed to read {url}."))?;
    let buf = JsFuture::from(promise)
        .await
        .map_err(|_| format!("Failed to read {url}."))?;
    Ok(js_sys::Uint8Array::new(&buf).to_vec())
}

async fn read_first_file(list: &FileList) -> Option<(String, Vec<u8>)> {
    let file = list.item(0)?;
    let name = file.name();
    let buf = JsFuture::from(file.array_buffer()).await.ok()?;
    Some((name, js_sys::Uint8Array::new(&buf).to_vec()))
}

fn plot_figure(div_id: &str, figure: &serde_json::Value) {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    let (Ok(data), Ok(layout)) = (
        figure["data"].serialize(&serializer),
        figure["layout"].serialize(&serializer),
    ) else {
        return;
    };
    let Some(div) = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(div_id))
    else {
        return;
    };
    let plotly = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("Plotly"))
        .unwrap_or(JsValue::UNDEFINED);
    if let Ok(func) = js_sys::Reflect::get(&plotly, &JsValue::from_str("react"))
        .and_then(|v| v.dyn_into::<js_sys::Function>())
    {
        let _ = func.call3(&JsValue::NULL, &JsValue::from(div), &data, &layout);
    }
}

fn blob_url_from_str(s: &str) -> Option<String> {
    let arr = js_sys::Array::new();
    arr.push(&JsValue::from_str(s));
    let blob = Blob::new_with_str_sequence(&arr).ok()?;
    web_sys::Url::create_object_url_with_blob(&blob).ok()
}

#[component]
pub fn App() -> impl IntoView {
    let search = web_sys::window()
        .and_then(|w| w.location().search().ok())
        .unwrap_or_default();
    let (config, config_note) = config_from_query(&search);
    let layout = config.layout_style;
    let debug = config.debug;

    let (table, set_table) = create_signal(Option::<InputTable>::None);
    let (params, set_params) = create_signal(ProfitParams::ui_initial());
    let (status, set_status) = create_signal(
        config_note.unwrap_or_else(|| format!("Loading {}…", config.data_path)),
    );
    let (summary, set_summary) = create_signal(Option::<ProfitSummary>::None);
    let (compute_ms, set_compute_ms) = create_signal(0.0_f64);
    let (csv_href, set_csv_href) = create_signal(String::new());

    let load_bytes = move |name: String, bytes: Vec<u8>| match InputTable::from_bytes(&bytes) {
        Ok(input) => {
            set_status.set(format!("Loaded {} rows from {name}.", input.len()));
            set_table.set(Some(input));
        }
        Err(err) => set_status.set(format!("Cannot use {name}: {err}")),
    };

    // The table is fetched once; later replacements only come from user uploads.
    {
        let data_path = config.data_path.clone();
        spawn_local(async move {
            match fetch_bytes(&data_path).await {
                Ok(bytes) => load_bytes(data_path, bytes),
                Err(err) => set_status.set(err),
            }
        });
    }

    // Recompute and replace the chart on every table or slider change.
    create_effect(move |_| {
        let params_now = params.get();
        table.with(|current| {
            let Some(input) = current.as_ref() else {
                return;
            };
            let started = js_sys::Date::now();
            let output = recompute(input, &params_now);
            set_compute_ms.set(js_sys::Date::now() - started);
            plot_figure(PLOT_DIV, &plotly_figure(&output.grid, layout));
            set_summary.set(Some(output.table.summary()));

            let old = csv_href.get_untracked();
            if !old.is_empty() {
                let _ = web_sys::Url::revoke_object_url(&old);
            }
            let href = output
                .table
                .to_csv_string()
                .ok()
                .and_then(|text| blob_url_from_str(&text))
                .unwrap_or_default();
            set_csv_href.set(href);
        });
    });

    let on_file = move |ev: leptos::ev::Event| {
        let Some(input) = ev
            .target()
            .and_then(|t| t.dyn_into::<HtmlInputElement>().ok())
        else {
            return;
        };
        let Some(list) = input.files() else {
            return;
        };
        set_status.set("Reading file…".to_string());
        spawn_local(async move {
            match read_first_file(&list).await {
                Some((name, bytes)) => load_bytes(name, bytes),
                None => set_status.set("No readable file selected.".to_string()),
            }
            input.set_value("");
        });
    };

    let slider_view = move |spec: SliderSpec| {
        view! {
            <div id=format!("{}-label", spec.id) class="slider">
                <label for=spec.id>{spec.label}</label>
                <input
                    type="range"
                    id=spec.id
                    min=spec.min
                    max=spec.max
                    step=spec.step
                    prop:value=move || params.get().get(spec.kind).to_string()
                    on:input=move |ev| {
                        if let Ok(v) = event_target_value(&ev).parse::<f64>() {
                            set_params.update(|p| *p = p.with(spec.kind, v));
                        }
                    }
                />
                <span class="slider-value">{move || params.get().get(spec.kind).to_string()}</span>
            </div>
        }
    };

    let debug_panel = debug.then(|| {
        view! {
            <section class=layout.section_class()>
                <h3>"Diagnostics"</h3>
                <p class="note">
                    {move || {
                        summary
                            .get()
                            .map(|s| describe_summary(&s, compute_ms.get()))
                            .unwrap_or_else(|| "No data yet.".to_string())
                    }}
                </p>
                <p class="note">{move || format!("{:?}", params.get())}</p>
            </section>
        }
    });

    view! {
        <main class=layout.container_class() on:dragover=move |e| { e.prevent_default(); } on:drop=move |e| {
            e.prevent_default();
            if let Some(list) = e.data_transfer().and_then(|dt| dt.files()) {
                spawn_local(async move {
                    if let Some((name, bytes)) = read_first_file(&list).await {
                        load_bytes(name, bytes);
                    }
                });
            }
        }>
            <section class=layout.section_class()>
                <h1>"Interactive Techno-Economic Analysis"</h1>
                <p>
                    "This is an interactive analysis that considers the impact of additive costs and product value on the potential for profit. Profit values appear binned because this is built on top of a random forest model fit to (dummy) experimental data. This model predicts yield given A and B concentrations during fermentation. Use the sliders to explore how product cost and additive concentration affects profit margin:"
                </p>
            </section>
            <section class=layout.section_class()>
                <div id=PLOT_DIV class="plot"></div>
                {SLIDERS.into_iter().map(slider_view).collect_view()}
            </section>
            <section class="files">
                <label class="note">"Replace dataset: "
                    <input type="file" accept=".csv,text/csv" on:change=on_file />
                </label>
                <span class="note">{move || status.get()}</span>
                <a href=move || csv_href.get() download="profit.csv"
                    style=move || if csv_href.get().is_empty() { "display:none;".to_string() } else { "display:inline;".to_string() }>
                    "Download profit.csv"
                </a>
            </section>
            {debug_panel}
            <footer>
                <p class="note">{"Version "}{APP_VERSION}{" ("}{APP_COMMIT}{")"}</p>
            </footer>
        </main>
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    leptos::mount_to_body(|| view! { <App/> });
}
