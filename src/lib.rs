// Library crate - Point & Figure charting engine and the analyses built on it

pub mod error;
pub mod types;
pub mod config;
pub mod series;
pub mod engine;
pub mod cache;
pub mod chart;
pub mod render;
pub mod batch;
pub mod loader;

// Re-export commonly used types
pub use error::{PnfError, Result};
pub use types::*;
pub use config::{BoxSize, ChartConfig, CountParams, Overscan, SignalParams, TrendlineMode, TrendlineParams};
pub use series::{NormalizedSeries, TimeSeries, TimeStep};
pub use cache::AnalysisCache;
pub use chart::{NextSignal, PointFigureChart};
pub use render::{render, RenderOptions};
pub use batch::build_charts;
