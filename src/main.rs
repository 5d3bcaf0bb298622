// Keyhost — host binary.
//
// Launched by the browser as a native-messaging host: stdin/stdout carry the
// framed extension channel, so every log line goes to stderr.

use clap::Parser;
use keyhost::atoms::constants::{HOST_VERSION, SHUTDOWN_GRACE_MS};
use keyhost::engine::extension;
use keyhost::engine::instance::{InstanceGuard, InstanceStatus};
use keyhost::engine::peer::PeerChannel;
use keyhost::engine::tools;
use keyhost::{EngineResult, HostConfig, HostState};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Local custody host for the keyhost browser extension and agent")]
struct Args {
    /// Path to the TOML config file. Without one, built-in defaults apply.
    #[arg(long, env = "KEYHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for wallets and the PID file (overrides the config).
    #[arg(long, env = "KEYHOST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "keyhost=trace").
    #[arg(long, env = "KEYHOST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str()))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("[host] Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> EngineResult<()> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.host.data_dir = Some(dir);
    }
    let data_dir = config.data_dir();
    info!("[host] keyhost {} starting (data dir {})", HOST_VERSION, data_dir.display());

    let _guard = match InstanceGuard::acquire(&data_dir)? {
        InstanceStatus::Held(guard) => guard,
        InstanceStatus::NotHeld { pid } => {
            warn!("[host] Host already running as pid {}; exiting", pid);
            return Ok(());
        }
    };

    let state = HostState::new(config)?;
    if state.config().host.agent_surface {
        info!(
            "[host] Agent surface: {} tool(s), {} resource(s)",
            tools::definitions().len(),
            tools::resources::definitions().len()
        );
    }

    let channel = PeerChannel::new(tokio::io::stdout());
    extension::attach(&channel, &state, state.config().rpc_options());
    let shutdown = state.shutdown_token();

    tokio::select! {
        res = channel.run(tokio::io::stdin()) => match res {
            Ok(()) => info!("[host] Extension disconnected"),
            Err(e) => error!("[host] Extension channel failed: {}", e),
        },
        _ = shutdown.cancelled() => {
            info!("[host] Shutdown requested by the extension");
            tokio::time::sleep(Duration::from_millis(SHUTDOWN_GRACE_MS)).await;
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("[host] Signal handler failed: {}", e);
            }
            info!("[host] Interrupted");
        }
    }

    state.request_shutdown();
    info!("[host] Stopped");
    Ok(())
}
