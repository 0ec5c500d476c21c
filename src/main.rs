mod chains;
mod config;
mod data;
mod poller;
mod rpc;
mod selection;
mod ui;

use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use eyre::{WrapErr, eyre};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Serialize;
use std::{
    fs::OpenOptions,
    io::{Stdout, stdout},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use config::{
    ETH_USD_FEED_DEFAULT, LOG_FILE_DEFAULT, PROJECT_DESCRIPTION, REFRESH_INTERVAL_DEFAULT,
    REQUEST_TIMEOUT_DEFAULT, RPC_TEMPLATE_DEFAULT, STATE_FILE_DEFAULT,
};
use data::{GasAggregator, GasRow, Snapshot};
use poller::{GenerationGate, Poller};
use rpc::{ChainlinkFeed, HttpClientFactory};
use selection::{JsonFileStore, Selection};
use ui::{Action, Dashboard, View};

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;
type Aggregator = GasAggregator<HttpClientFactory, ChainlinkFeed>;

#[derive(Debug, Parser)]
#[command(name = "chaingazer", about = PROJECT_DESCRIPTION)]
struct Cli {
    /// JSON file the tracked chains are persisted in
    #[arg(long, env = "CHAINGAZER_STATE_FILE", global = true, default_value = STATE_FILE_DEFAULT)]
    state_file: PathBuf,

    /// Seconds between refreshes
    #[arg(
        long,
        env = "CHAINGAZER_INTERVAL_SECS",
        global = true,
        default_value_t = REFRESH_INTERVAL_DEFAULT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_secs: u64,

    /// Seconds before a single RPC call is given up on
    #[arg(
        long,
        env = "CHAINGAZER_TIMEOUT_SECS",
        global = true,
        default_value_t = REQUEST_TIMEOUT_DEFAULT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_secs: u64,

    /// Endpoint for chains without a preconfigured RPC URL. `{chain_id}` is replaced with the chain id
    #[arg(long, env = "CHAINGAZER_RPC_TEMPLATE", global = true, default_value = RPC_TEMPLATE_DEFAULT)]
    rpc_template: String,

    /// Ethereum mainnet RPC used to read the price feed. Defaults to the catalog endpoint
    #[arg(long, env = "CHAINGAZER_ETH_RPC_URL", global = true)]
    eth_rpc_url: Option<String>,

    /// ETH/USD price feed contract address
    #[arg(long, env = "CHAINGAZER_PRICE_FEED", global = true, default_value = ETH_USD_FEED_DEFAULT)]
    price_feed: String,

    /// Skip the price feed and show gas prices only
    #[arg(long, env = "CHAINGAZER_NO_USD", global = true)]
    no_usd: bool,

    /// Where the dashboard writes its logs. `snapshot` logs to stderr
    #[arg(long, env = "CHAINGAZER_LOG_FILE", global = true, default_value = LOG_FILE_DEFAULT)]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Debug, Default, Clone, Subcommand)]
enum Subcommands {
    #[default]
    /// Live dashboard of the tracked chains
    Dashboard,
    /// Refresh once, print the sorted gas prices and exit
    Snapshot {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or_default();

    match command {
        Subcommands::Dashboard => {
            init_tracing(Some(&cli.log_file))?;
            run_dashboard(&cli).await
        }
        Subcommands::Snapshot { json } => {
            init_tracing(None)?;
            run_snapshot(&cli, json).await
        }
    }
}

fn init_tracing(log_file: Option<&PathBuf>) -> eyre::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false).with_target(true))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

fn build_aggregator(cli: &Cli) -> eyre::Result<Aggregator> {
    let oracle = if cli.no_usd {
        None
    } else {
        let rpc_url = match &cli.eth_rpc_url {
            Some(url) => url.clone(),
            None => chains::lookup(1)
                .and_then(|c| c.rpc_url)
                .ok_or_else(|| eyre!("no Ethereum RPC URL configured"))?
                .to_string(),
        };
        Some(ChainlinkFeed::new(&rpc_url, &cli.price_feed)?)
    };

    Ok(GasAggregator::new(
        HttpClientFactory,
        oracle,
        cli.rpc_template.clone(),
        Duration::from_secs(cli.timeout_secs),
    ))
}

#[derive(Debug, Serialize)]
struct SnapshotReport {
    usd_price: Option<f64>,
    chains: Vec<GasRow>,
}

async fn run_snapshot(cli: &Cli, json: bool) -> eyre::Result<()> {
    let selection = Selection::load(JsonFileStore::new(&cli.state_file));
    let aggregator = build_aggregator(cli)?;

    let snapshot = aggregator.refresh(selection.ids()).await;
    let rows = data::rows(Some(&snapshot), selection.ids());

    if json {
        let report = SnapshotReport {
            usd_price: snapshot.usd_price,
            chains: rows,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for row in &rows {
        let price = match (&row.gwei, row.error) {
            (Some(gwei), _) => format!("{} Gwei", gwei),
            (None, true) => config::ERROR_SENTINEL.to_string(),
            (None, false) => "N/A".to_string(),
        };
        let usd = row.usd_estimate.map(|u| format!("~${:.2}", u)).unwrap_or_default();
        println!("{:<14}{:>16}  {}", row.name, price, usd);
    }
    Ok(())
}

async fn run_dashboard(cli: &Cli) -> eyre::Result<()> {
    let store = JsonFileStore::new(&cli.state_file);
    tracing::info!(state_file = %store.path().display(), "starting dashboard");
    let mut selection = Selection::load(store);

    let interval = Duration::from_secs(cli.interval_secs);
    let aggregator = Arc::new(build_aggregator(cli)?);
    let (poller, mut updates) = Poller::spawn(aggregator, selection.ids().to_vec(), interval);

    let mut terminal = setup_terminal()?;
    let result = dashboard_loop(&mut terminal, &poller, &mut updates, &mut selection, interval);
    cleanup_terminal(&mut terminal)?;
    drop(poller);

    tracing::info!("dashboard closed");
    result
}

fn dashboard_loop(
    terminal: &mut CrosstermTerminal,
    poller: &Poller,
    updates: &mut tokio::sync::mpsc::Receiver<poller::Refreshed>,
    selection: &mut Selection<JsonFileStore>,
    interval: Duration,
) -> eyre::Result<()> {
    let mut dashboard = Dashboard::new();
    let mut gate = GenerationGate::default();
    let mut snapshot: Option<Snapshot> = None;

    loop {
        while let Ok(update) = updates.try_recv() {
            if gate.accept(update.generation) {
                snapshot = Some(update.snapshot);
            }
        }

        let rows = data::rows(snapshot.as_ref(), selection.ids());
        let view = View {
            rows: &rows,
            selection: selection.ids(),
            snapshot: snapshot.as_ref(),
            interval,
        };
        terminal.draw(|frame| dashboard.render(frame, &view))?;

        let mut action = None;
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    action = dashboard.handle_key(key.code, &view);
                }
            }
        }

        let changed = match action {
            Some(Action::Refresh) => {
                poller.refresh_now();
                false
            }
            Some(Action::Toggle(id)) => {
                selection.toggle(id);
                true
            }
            Some(Action::Remove(id)) => selection.remove(id),
            Some(Action::Add(text)) => match selection.add_input(&text) {
                Some(id) => {
                    tracing::info!(chain_id = id, "chain added");
                    true
                }
                None => false,
            },
            None => false,
        };
        if changed {
            poller.set_selection(selection.ids().to_vec());
        }

        if dashboard.should_quit {
            return Ok(());
        }
    }
}

fn setup_terminal() -> eyre::Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn cleanup_terminal(terminal: &mut CrosstermTerminal) -> eyre::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
