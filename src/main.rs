use analyzer::{
    commands::analyze,
    config::{AnalyzerSettings, ReportFormat},
    context::AppContext,
    trade_log::TickerFilter,
};
use anyhow::Result;
use clap::Parser;
use log::info;
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "analyzer")]
#[command(about = "Evaluate logged trade signals against historical candles")]
struct Cli {
    /// Analyze only this ticker
    #[arg(value_name = "TICKER", conflicts_with = "exclude")]
    ticker: Option<String>,
    /// Analyze every ticker except this one
    #[arg(short = 'e', long = "exclude", value_name = "TICKER")]
    exclude: Option<String>,
    /// Trade log CSV (defaults to $ANALYZER_TRADE_LOG, then tradelog.csv)
    #[arg(long = "trade-log", value_name = "PATH")]
    trade_log: Option<PathBuf>,
    /// Cost model file (defaults to $ANALYZER_COST_CONFIG, then analyze_conf.txt)
    #[arg(long = "cost-config", value_name = "PATH")]
    cost_config: Option<PathBuf>,
    /// Directory holding <TICKER>.csv price files (defaults to $ANALYZER_DATA_DIR, then .)
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Worker threads for per-ticker evaluation
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    threads: Option<u16>,
}

impl Cli {
    fn ticker_filter(&self) -> TickerFilter {
        match (&self.ticker, &self.exclude) {
            (Some(ticker), _) => TickerFilter::Only(ticker.clone()),
            (None, Some(excluded)) => TickerFilter::Exclude(excluded.clone()),
            (None, None) => TickerFilter::All,
        }
    }
}

/// Report file that is only created on the first write, so a run that fails
/// before rendering leaves any existing file untouched.
struct ReportFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl ReportFile {
    fn new(path: PathBuf) -> Self {
        Self { path, writer: None }
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let file = File::create(&self.path).map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("Failed to create report file {}: {}", self.path.display(), err),
                )
            })?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "report file not open"))
    }
}

impl Write for ReportFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(threads) = cli.threads {
        env::set_var("RAYON_NUM_THREADS", threads.to_string());
    }

    let filter = cli.ticker_filter();
    let settings = AnalyzerSettings::resolve(
        cli.trade_log,
        cli.cost_config,
        cli.data_dir,
        cli.format,
        cli.output,
    );
    let app_context = AppContext::initialize(settings);

    let mut out: Box<dyn Write> = match app_context.settings().output.clone() {
        Some(path) => Box::new(ReportFile::new(path)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if let Some(report) = analyze::run(&app_context, &filter, out.as_mut())? {
        info!(
            "Evaluated {} trade(s) across {} ticker(s)",
            report.total_trades,
            report.tickers.len()
        );
    }

    Ok(())
}
