use serde::{Deserialize, Serialize};

/// Enumerated chart types the model may pick from. Anything outside this set
/// fails deserialization and lands on the table fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Table,
}

impl ChartKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Table => "table",
        }
    }
}

/// Declarative chart description returned by the model: a chart type from the
/// enumerated set plus column mappings. This replaces executing
/// model-generated plotting code outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart: ChartKind,
    /// Column holding category labels / x values.
    #[serde(default)]
    pub x: Option<String>,
    /// Column holding the numeric series.
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ChartSpec {
    pub fn table() -> Self {
        Self {
            chart: ChartKind::Table,
            x: None,
            y: None,
            title: None,
        }
    }
}
