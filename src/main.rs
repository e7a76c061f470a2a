use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pointfigure::batch::build_charts;
use pointfigure::chart::{NextSignal, PointFigureChart};
use pointfigure::config::{BoxSize, ChartConfig, CountParams, SignalParams, TrendlineMode, TrendlineParams};
use pointfigure::engine::{Breakout, ColumnProfile, Count, IndicatorSeries, RatedSignal, ScoreOutlook, Signal, Trendline};
use pointfigure::loader::read_series_file;
use pointfigure::render::{render, RenderOptions};
use pointfigure::types::{Method, Scaling};

#[derive(Parser, Debug)]
#[command(name = "pnf")]
#[command(about = "Point & Figure charts from OHLC(V) CSV files")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct ChartArgs {
    /// CSV file with a header naming date, open, high, low, close, volume
    file: PathBuf,

    /// Price method: cl, h/l, l/h, hlc, ohlc
    #[arg(short, long, default_value = "cl", env = "PNF_METHOD")]
    method: Method,

    /// Scaling: abs, log, cla, atr
    #[arg(short, long, default_value = "abs", env = "PNF_SCALING")]
    scaling: Scaling,

    /// Box size (percent for log, periods or 'total' for atr)
    #[arg(short, long, default_value = "1", env = "PNF_BOX_SIZE")]
    box_size: BoxSize,

    /// Optional title suffix
    #[arg(short, long, env = "PNF_TITLE")]
    title: Option<String>,
}

impl ChartArgs {
    fn config(&self, reversal: u32) -> ChartConfig {
        ChartConfig {
            method: self.method,
            reversal,
            scaling: self.scaling,
            box_size: self.box_size,
            title: self.title.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build one chart and print it
    Chart {
        #[command(flatten)]
        chart: ChartArgs,

        /// Boxes needed for a reversal
        #[arg(short, long, default_value = "3", env = "PNF_REVERSAL")]
        reversal: u32,

        /// Rightmost columns to print, 0 for all
        #[arg(short, long, default_value = "30", env = "PNF_COLUMNS")]
        columns: usize,

        /// Minimum trendline length
        #[arg(long, default_value = "4", env = "PNF_TRENDLINE_LENGTH")]
        trendline_length: usize,

        /// Trendlines stop only at opposite breakouts
        #[arg(long)]
        weak: bool,

        /// Triangles need exactly converging columns
        #[arg(long)]
        strict: bool,

        /// Print a JSON report instead of the chart
        #[arg(long)]
        json: bool,
    },

    /// Build charts for several reversals in parallel and summarise them
    Batch {
        #[command(flatten)]
        chart: ChartArgs,

        /// Reversals to build (comma-separated)
        #[arg(short, long, default_value = "1,2,3", value_delimiter = ',', env = "PNF_REVERSALS")]
        reversals: Vec<u32>,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    title: String,
    config: &'a ChartConfig,
    box_size: f64,
    columns: usize,
    column_labels: Vec<Option<String>>,
    profiles: Vec<ColumnProfile>,
    breakouts: &'a [Breakout],
    trendlines: &'a [Trendline],
    signals: &'a [Signal],
    counts: &'a [Count],
    rated_signals: &'a [RatedSignal],
    double_top_buys: IndicatorSeries,
    double_bottom_sells: IndicatorSeries,
    next_signal: NextSignal,
    score: ScoreOutlook,
}

fn run_chart(
    chart_args: ChartArgs,
    reversal: u32,
    columns: usize,
    trendlines: TrendlineParams,
    signals: SignalParams,
    json: bool,
) -> Result<()> {
    let series = read_series_file(&chart_args.file)?;
    let chart = PointFigureChart::new(&series, chart_args.config(reversal))
        .with_context(|| format!("Failed to build chart from {:?}", chart_args.file))?;

    if json {
        let breakouts = chart.breakouts()?;
        let lines = chart.trendlines(trendlines)?;
        let found = chart.signals(signals)?;
        let counts = chart.counts(CountParams::default())?;
        let rated = chart.rated_signals()?;
        let (buys, sells) = chart.buy_sell_levels(2)?;
        let report = Report {
            title: chart.title(),
            config: chart.config(),
            box_size: chart.scale_spec().box_size(),
            columns: chart.matrix().columns(),
            column_labels: chart.column_labels(),
            profiles: chart.profiles(),
            breakouts: &breakouts,
            trendlines: &lines,
            signals: &found,
            counts: &counts,
            rated_signals: &rated,
            double_top_buys: buys,
            double_bottom_sells: sells,
            next_signal: chart.next_simple_signal(),
            score: chart.score_changes(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let options = RenderOptions {
            columns,
            trendline_params: trendlines,
            signal_params: signals,
            ..Default::default()
        };
        print!("{}", render(&chart, options)?);

        let next = chart.next_simple_signal();
        let level = |v: Option<f64>| v.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        println!("\nNext buy: {} | next sell: {}", level(next.buy), level(next.sell));

        let outlook = chart.score_changes();
        let changes: Vec<String> = outlook
            .changes
            .iter()
            .map(|c| format!("{} at {}", c.to, c.price))
            .collect();
        println!("Signal score: {} | changes: {}", outlook.score, changes.join(", "));
    }

    Ok(())
}

fn run_batch(chart_args: ChartArgs, reversals: Vec<u32>) -> Result<()> {
    let series = read_series_file(&chart_args.file)?;
    let configs: Vec<ChartConfig> = reversals.iter().map(|&r| chart_args.config(r)).collect();

    info!("Building {} charts", configs.len());
    for (config, result) in configs.iter().zip(build_charts(&series, &configs)) {
        match result {
            Ok(chart) => {
                let signals = chart.signals(SignalParams::default())?;
                let last = signals.last().map(|s| s.kind.label()).unwrap_or("-");
                println!(
                    "{:50} | columns: {:4} | breakouts: {:4} | signals: {:4} | last signal: {}",
                    chart.title(),
                    chart.matrix().columns(),
                    chart.breakouts()?.len(),
                    signals.len(),
                    last
                );
            }
            Err(e) => println!("{:50} | error: {}", config.title(), e),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Chart {
            chart,
            reversal,
            columns,
            trendline_length,
            weak,
            strict,
            json,
        } => {
            let mode = if weak { TrendlineMode::Weak } else { TrendlineMode::Strong };
            run_chart(
                chart,
                reversal,
                columns,
                TrendlineParams {
                    length: trendline_length,
                    mode,
                },
                SignalParams { strict },
                json,
            )?;
        }
        Commands::Batch { chart, reversals } => {
            run_batch(chart, reversals)?;
        }
    }

    Ok(())
}
