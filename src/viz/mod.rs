use crate::llm::models::{ChartKind, ChartSpec};
use plotters::element::Pie;
use plotters::prelude::*;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

const PALETTE: [RGBColor; 8] = [
    RGBColor(66, 133, 244),
    RGBColor(219, 68, 55),
    RGBColor(244, 180, 0),
    RGBColor(15, 157, 88),
    RGBColor(171, 71, 188),
    RGBColor(0, 172, 193),
    RGBColor(255, 112, 67),
    RGBColor(158, 157, 36),
];

#[derive(Debug)]
pub enum VizError {
    /// The chart spec could not be parsed or does not fit the result shape.
    Spec(String),
    /// The plotting backend failed while drawing.
    Render(String),
}

impl fmt::Display for VizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VizError::Spec(msg) => write!(f, "chart spec error: {}", msg),
            VizError::Render(msg) => write!(f, "chart render error: {}", msg),
        }
    }
}

impl Error for VizError {}

/// Renders the model-chosen chart spec to a PNG at `path`. Any failure to
/// parse or draw the spec falls back to a static table rendering of the raw
/// result under the same filename; only a failure of the fallback itself is
/// an error. Returns the chart kind actually rendered.
pub fn save_visualization(
    spec_text: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    path: &Path,
) -> Result<ChartKind, VizError> {
    let rendered = parse_spec(spec_text).and_then(|spec| {
        render_chart(&spec, columns, rows, path).map(|_| spec.chart)
    });

    match rendered {
        Ok(kind) => {
            info!("Saved {} chart to {}", kind.label(), path.display());
            Ok(kind)
        }
        Err(e) => {
            warn!("Chart rendering failed ({}), falling back to table", e);
            render_table(columns, rows, path)?;
            info!("Saved fallback table to {}", path.display());
            Ok(ChartKind::Table)
        }
    }
}

/// Parses the model reply into a chart spec, tolerating markdown fences.
pub fn parse_spec(text: &str) -> Result<ChartSpec, VizError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    serde_json::from_str(cleaned).map_err(|e| VizError::Spec(e.to_string()))
}

fn render_chart(
    spec: &ChartSpec,
    columns: &[String],
    rows: &[Vec<Value>],
    path: &Path,
) -> Result<(), VizError> {
    match spec.chart {
        ChartKind::Table => render_table(columns, rows, path),
        ChartKind::Bar | ChartKind::Line | ChartKind::Pie => {
            let (labels, values) = extract_series(spec, columns, rows)?;
            match spec.chart {
                ChartKind::Bar => render_bar(spec, &labels, &values, path),
                ChartKind::Line => render_line(spec, &labels, &values, path),
                ChartKind::Pie => render_pie(spec, &labels, &values, path),
                ChartKind::Table => unreachable!(),
            }
        }
    }
}

/// Resolves the label and numeric columns the spec asks for. A column the
/// spec names but the result lacks is a spec failure, as is a result with no
/// numeric column at all.
fn extract_series(
    spec: &ChartSpec,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<(Vec<String>, Vec<f64>), VizError> {
    if rows.is_empty() {
        return Err(VizError::Spec("result has no rows to plot".to_string()));
    }

    let x_idx = match spec.x.as_deref() {
        Some(name) => column_index(columns, name)
            .ok_or_else(|| VizError::Spec(format!("unknown x column: {}", name)))?,
        None => 0,
    };

    let y_idx = match spec.y.as_deref() {
        Some(name) => column_index(columns, name)
            .ok_or_else(|| VizError::Spec(format!("unknown y column: {}", name)))?,
        None => first_numeric_column(rows)
            .ok_or_else(|| VizError::Spec("no numeric column in result".to_string()))?,
    };

    let mut labels = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let value = row
            .get(y_idx)
            .and_then(numeric)
            .ok_or_else(|| VizError::Spec(format!("non-numeric value in column {}", y_idx)))?;
        labels.push(row.get(x_idx).map(display_value).unwrap_or_default());
        values.push(value);
    }

    Ok((labels, values))
}

fn render_bar(
    spec: &ChartSpec,
    labels: &[String],
    values: &[f64],
    path: &Path,
) -> Result<(), VizError> {
    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let max_y = values.iter().cloned().fold(f64::MIN, f64::max).max(0.0);
    let top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };
    let n = labels.len() as i32;

    let mut chart = ChartBuilder::on(&root)
        .caption(title_of(spec), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..n, 0f64..top)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len().min(20))
        .x_label_formatter(&|i| {
            labels
                .get(*i as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            let color = PALETTE[i % PALETTE.len()];
            Rectangle::new([(i as i32, 0.0), (i as i32 + 1, *v)], color.mix(0.7).filled())
        }))
        .map_err(render_err)?;

    root.present().map_err(render_err)
}

fn render_line(
    spec: &ChartSpec,
    labels: &[String],
    values: &[f64],
    path: &Path,
) -> Result<(), VizError> {
    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let max_y = values.iter().cloned().fold(f64::MIN, f64::max).max(0.0);
    let min_y = values.iter().cloned().fold(f64::MAX, f64::min).min(0.0);
    let top = if max_y > min_y { max_y + (max_y - min_y) * 0.1 } else { max_y + 1.0 };
    let n = (labels.len() as i32 - 1).max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(title_of(spec), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0i32..n, min_y..top)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_labels(labels.len().min(20))
        .x_label_formatter(&|i| {
            labels
                .get(*i as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            values.iter().enumerate().map(|(i, v)| (i as i32, *v)),
            PALETTE[0].stroke_width(3),
        ))
        .map_err(render_err)?;

    root.present().map_err(render_err)
}

fn render_pie(
    spec: &ChartSpec,
    labels: &[String],
    values: &[f64],
    path: &Path,
) -> Result<(), VizError> {
    if values.iter().any(|v| *v <= 0.0) {
        return Err(VizError::Spec(
            "pie chart requires strictly positive values".to_string(),
        ));
    }

    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let pie_area = root
        .titled(&title_of(spec), ("sans-serif", 24))
        .map_err(render_err)?;

    let colors: Vec<RGBColor> = (0..values.len())
        .map(|i| PALETTE[i % PALETTE.len()])
        .collect();
    let center = (450, 290);
    let radius = 220.0;
    let owned_labels: Vec<String> = labels.to_vec();

    let pie = Pie::new(&center, &radius, values, &colors, &owned_labels);
    pie_area.draw(&pie).map_err(render_err)?;

    root.present().map_err(render_err)
}

/// Static table rendering of the raw result, used directly when the model
/// asks for a table and as the fallback for every other failure.
pub fn render_table(columns: &[String], rows: &[Vec<Value>], path: &Path) -> Result<(), VizError> {
    let ncols = columns.len().max(1) as u32;
    let nrows = rows.len() as u32;
    let cell_w = 160u32;
    let cell_h = 28u32;
    let width = (ncols * cell_w).clamp(320, 1600);
    let height = ((nrows + 1) * cell_h + 20).clamp(120, 2400);

    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    for (c, name) in columns.iter().enumerate() {
        let x = (c as u32 * cell_w + 8) as i32;
        root.draw(&Text::new(
            name.clone(),
            (x, 8),
            ("sans-serif", 17).into_font(),
        ))
        .map_err(render_err)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let y = ((r as u32 + 1) * cell_h + 10) as i32;
        for (c, value) in row.iter().enumerate() {
            let x = (c as u32 * cell_w + 8) as i32;
            root.draw(&Text::new(
                display_value(value),
                (x, y),
                ("sans-serif", 14).into_font(),
            ))
            .map_err(render_err)?;
        }
    }

    root.present().map_err(render_err)
}

fn render_err<E: fmt::Display>(e: E) -> VizError {
    VizError::Render(e.to_string())
}

fn title_of(spec: &ChartSpec) -> String {
    spec.title.clone().unwrap_or_default()
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}

fn first_numeric_column(rows: &[Vec<Value>]) -> Option<usize> {
    let first = rows.first()?;
    first.iter().position(|v| numeric(v).is_some())
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
