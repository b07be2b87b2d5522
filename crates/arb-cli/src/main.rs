mod bridge;
mod host;
mod script;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arb_core::{MATRIX_LEN, Timestamp, decode};
use arb_store::{BridgeConfig, DataDir, Store};
use clap::{Parser, Subcommand};

use crate::host::Host;

#[derive(Parser)]
#[command(name = "arb", about = "AR anchor bridge: stdio session host and ledger tools")]
struct Cli {
    /// Data directory (defaults to $ARB_DATA_DIR, then ~/.arbridge)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to arb.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the command/event channel on stdio
    Serve,

    /// Run a JSON-lines command script offline and print every line produced
    Script {
        /// Script file path
        path: PathBuf,
    },

    /// List hosted cloud anchors that have not expired
    Hosted,

    /// Remove a hosted anchor from the ledger
    Forget {
        /// Local anchor name
        name: String,
    },

    /// Decode a 16-value column-major transform into position and rotation
    Decode {
        #[arg(required = true, num_args = 16, allow_negative_numbers = true)]
        values: Vec<f64>,
    },
}

fn data_dir(cli: &Cli) -> DataDir {
    DataDir::resolve(cli.data_dir.as_deref())
}

fn load_config(cli: &Cli, dir: &DataDir) -> Result<BridgeConfig> {
    let path = cli.config.clone().unwrap_or_else(|| dir.config_path());
    BridgeConfig::load(&path).with_context(|| format!("failed to load config {}", path.display()))
}

fn open_store(dir: &DataDir) -> Result<Store> {
    dir.ensure().context("failed to create data directory")?;
    Store::open(&dir.ledger_path()).context("failed to open anchor ledger")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Script { path } => cmd_script(&cli, path),
        Commands::Hosted => cmd_hosted(&cli),
        Commands::Forget { name } => cmd_forget(&cli, name),
        Commands::Decode { values } => cmd_decode(values),
    }
}

// ---------------------------------------------------------------------------
// Advisory pidfile for observability
// ---------------------------------------------------------------------------

const PIDFILE: &str = "arb-serve.pid";

/// Check for an existing pidfile and log accordingly, then write our own.
fn acquire_pidfile(dir: &DataDir) -> Option<PathBuf> {
    let path = dir.base().join(PIDFILE);
    if let Ok(content) = std::fs::read_to_string(&path)
        && let Ok(pid) = content.trim().parse::<u32>()
    {
        if is_process_alive(pid) {
            tracing::warn!(pid, "another arb serve is running and shares the ledger");
        } else {
            tracing::info!(pid, "cleaned up stale pidfile");
            let _ = std::fs::remove_file(&path);
        }
    }

    match std::fs::File::create(&path) {
        Ok(mut f) => {
            let _ = write!(f, "{}", std::process::id());
            tracing::info!(path = %path.display(), "wrote pidfile");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to write pidfile");
            None
        }
    }
}

fn release_pidfile(path: &Path) {
    let _ = std::fs::remove_file(path);
    tracing::info!(path = %path.display(), "removed pidfile");
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence without sending a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let dir = data_dir(cli);
    let config = load_config(cli, &dir)?;
    let host = Host::open(&dir, &config)?;
    let pidfile = acquire_pidfile(&dir);

    let served = bridge::serve(host, &config).await;

    if let Some(path) = pidfile {
        release_pidfile(&path);
    }
    served
}

fn cmd_script(cli: &Cli, path: &Path) -> Result<()> {
    let dir = data_dir(cli);
    let config = load_config(cli, &dir)?;
    let mut host = Host::open(&dir, &config)?;
    let stdout = std::io::stdout();
    let count = script::run_file(&mut host, path, &mut stdout.lock())?;
    tracing::info!(
        requests = count,
        frames = host.session().frame_index(),
        "script finished"
    );
    Ok(())
}

fn cmd_hosted(cli: &Cli) -> Result<()> {
    let store = open_store(&data_dir(cli))?;
    let hosted = store
        .list_hosted(Timestamp::now())
        .context("failed to read anchor ledger")?;

    if hosted.is_empty() {
        println!("(no hosted anchors)");
        return Ok(());
    }
    for anchor in &hosted {
        let p = anchor.pose.position;
        println!(
            "{}\t{}\texpires {}\tat [{:.3}, {:.3}, {:.3}]",
            anchor.name, anchor.cloud_anchor_id, anchor.expires_at, p[0], p[1], p[2]
        );
    }
    Ok(())
}

fn cmd_forget(cli: &Cli, name: &str) -> Result<()> {
    let store = open_store(&data_dir(cli))?;
    if store.forget(name).context("failed to update anchor ledger")? {
        println!("forgot {name}");
    } else {
        println!("no hosted anchor named {name}");
    }
    Ok(())
}

fn cmd_decode(values: &[f64]) -> Result<()> {
    anyhow::ensure!(
        values.len() == MATRIX_LEN,
        "expected {MATRIX_LEN} values, got {}",
        values.len()
    );
    let pose = decode(values).context("failed to decode transform")?;
    let p = pose.position;
    let q = pose.rotation;
    println!("position: [{}, {}, {}]", p[0], p[1], p[2]);
    println!("rotation: [w={}, x={}, y={}, z={}]", q.w, q.x, q.y, q.z);
    Ok(())
}
