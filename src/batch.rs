//! Parallel chart construction
//!
//! Each configuration folds the series independently, so charts over one
//! series are built on the rayon pool. All charts share one analysis cache.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cache::AnalysisCache;
use crate::chart::PointFigureChart;
use crate::config::ChartConfig;
use crate::error::Result;
use crate::series::TimeSeries;

/// Build one chart per configuration, results in input order
pub fn build_charts(series: &TimeSeries, configs: &[ChartConfig]) -> Vec<Result<PointFigureChart>> {
    build_charts_with_cache(series, configs, AnalysisCache::shared())
}

pub fn build_charts_with_cache(
    series: &TimeSeries,
    configs: &[ChartConfig],
    cache: Arc<AnalysisCache>,
) -> Vec<Result<PointFigureChart>> {
    configs
        .par_iter()
        .map(|config| {
            let result = PointFigureChart::with_cache(series, config.clone(), Arc::clone(&cache));
            match &result {
                Ok(chart) => info!("Built {} with {} columns", chart.title(), chart.matrix().columns()),
                Err(e) => warn!("Failed to build {}: {}", config.title(), e),
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoxSize, SignalParams};
    use crate::error::PnfError;
    use crate::types::{Method, Scaling};

    #[test]
    fn test_results_follow_config_order() {
        let series = TimeSeries::from_close(vec![1.0, 5.0, 2.0, 7.0, 2.0]);
        let configs = vec![
            ChartConfig::default(),
            ChartConfig::new(Method::Close, 1, Scaling::Absolute, BoxSize::Value(1.0)),
            ChartConfig::new(Method::Close, 3, Scaling::Absolute, BoxSize::Value(0.0)),
        ];

        let charts = build_charts(&series, &configs);
        assert_eq!(charts.len(), 3);
        assert_eq!(charts[0].as_ref().unwrap().config().reversal, 3);
        assert_eq!(charts[1].as_ref().unwrap().config().reversal, 1);
        assert!(matches!(charts[2], Err(PnfError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_configs_share_analyses() {
        let series = TimeSeries::from_close(vec![5.0, 1.0, 6.0, 3.0, 7.0]);
        let cache = AnalysisCache::shared();
        let configs = vec![ChartConfig::default(); 4];

        let charts = build_charts_with_cache(&series, &configs, Arc::clone(&cache));
        for chart in &charts {
            chart.as_ref().unwrap().signals(SignalParams::default()).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
