use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};

use gexview::config::Settings;
use gexview::engine::orchestrator::FetchOrchestrator;
use gexview::engine::types::{FieldKey, LoadState, Symbol};
use gexview::market_data::adapters::fixture::FixtureProvider;
use gexview::market_data::adapters::thf::ThfClient;
use gexview::market_data::adapters::GammaProvider;
use gexview::market_data::transform::DealerGammaTransformer;
use gexview::telemetry::{self, LogTarget};
use gexview::view::columns::ColumnSpec;
use gexview::view::table::{display_order, write_csv, write_plain, Direction, SortState};
use gexview::view::tui::{self, TableApp};

#[derive(Parser)]
#[command(name = "gexview", version, about = "Dealer gamma table for an equity symbol")]
struct Cli {
    /// Settings file (defaults to ./gexview.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serve data from a JSON file instead of the remote service
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Interactive table (default)
    Tui {
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Fetch once and print the table
    Fetch {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Field to sort by (symbol, zerogex, strike, gamma)
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, requires = "sort")]
        desc: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
}

fn pick_symbol(arg: Option<String>, settings: &Settings) -> anyhow::Result<Symbol> {
    match arg {
        Some(raw) => Ok(Symbol::new(&raw)?),
        None => Ok(settings.default_symbol()?),
    }
}

fn sort_state(key: Option<String>, desc: bool, columns: &ColumnSpec) -> anyhow::Result<Option<SortState>> {
    let Some(key) = key else { return Ok(None) };
    let field: FieldKey = key.parse().map_err(|k| anyhow!("unknown sort field `{k}`"))?;
    let column = columns
        .position(field)
        .ok_or_else(|| anyhow!("`{field}` is not one of the displayed columns"))?;
    let direction = if desc { Direction::Descending } else { Direction::Ascending };
    Ok(Some(SortState { column, direction }))
}

async fn fetch_once(
    orchestrator: FetchOrchestrator,
    columns: &ColumnSpec,
    format: OutputFormat,
    sort: Option<SortState>,
) -> anyhow::Result<()> {
    orchestrator.mount().await?;
    match orchestrator.state() {
        LoadState::Ready { rows, .. } => {
            let order = display_order(&rows, columns, sort);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            match format {
                OutputFormat::Table => write_plain(&mut out, &rows, columns, &order)?,
                OutputFormat::Csv => write_csv(&mut out, &rows, columns, &order)?,
            }
            out.flush()?;
            Ok(())
        }
        LoadState::Failed { message } => bail!("{message}"),
        other => bail!("fetch did not complete: {other:?}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Cmd::Tui { symbol: None });

    let target = match &command {
        Cmd::Fetch { .. } => LogTarget::Stderr,
        Cmd::Tui { .. } => settings.log.file.clone().map(LogTarget::File).unwrap_or(LogTarget::Off),
    };
    telemetry::init_tracing(&settings.log.filter, target)?;
    telemetry::init_metrics()?;

    let provider: Arc<dyn GammaProvider> = match &cli.fixture {
        Some(path) => Arc::new(FixtureProvider::new(path)),
        None => Arc::new(ThfClient::new(&settings.api)?),
    };
    let columns = settings.column_spec()?;

    match command {
        Cmd::Tui { symbol } => {
            let symbol = pick_symbol(symbol, &settings)?;
            let orchestrator = FetchOrchestrator::new(provider, Arc::new(DealerGammaTransformer), symbol.clone());
            let app = TableApp::new(settings.symbol_options(), &symbol, columns);
            tui::run(orchestrator, app).await
        }
        Cmd::Fetch { symbol, format, sort, desc } => {
            let symbol = pick_symbol(symbol, &settings)?;
            let sort = sort_state(sort, desc, &columns)?;
            let orchestrator = FetchOrchestrator::new(provider, Arc::new(DealerGammaTransformer), symbol);
            fetch_once(orchestrator, &columns, format, sort).await
        }
    }
}
