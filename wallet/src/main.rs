mod presenter;
mod simulate;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use punchcard_core::{
    config::{RouterConfig, SequencerConfig, TransportConfig, WalletConfig},
    transport::ConnectionStatus,
    PushTransport, WalletRuntime,
};
use punchcard_proto::UserId;
use punchcard_websocket_client::WebsocketTransport;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::presenter::HeadlessPresenter;

#[derive(Parser, Debug)]
#[command(name = "punchcard-wallet", about = "Headless punchcard customer wallet")]
struct Args {
    /// Push server to connect to
    #[arg(long, env = "PUNCHCARD_SERVER_URL", default_value = "ws://localhost:9797/ws")]
    server_url: String,

    /// Customer whose cards are shown
    #[arg(long, env = "PUNCHCARD_USER_ID")]
    user_id: Option<String>,

    /// Delay before a newly created card slides in
    #[arg(long, default_value_t = 2500)]
    reveal_grace_ms: u64,

    /// How long a step may wait for its animation to finish; 0 waits forever
    #[arg(long, default_value_t = 15_000)]
    watchdog_ms: u64,

    /// How long the headless presenter takes to "play" each animation
    #[arg(long, default_value_t = 600)]
    animation_ms: u64,

    /// Run a scripted session against an in-process server instead of connecting
    #[arg(long)]
    simulate: bool,
}

impl Args {
    fn config(&self) -> WalletConfig {
        WalletConfig {
            sequencer: SequencerConfig { signal_watchdog: (self.watchdog_ms > 0).then(|| Duration::from_millis(self.watchdog_ms)) },
            router: RouterConfig { reveal_grace: Duration::from_millis(self.reveal_grace_ms) },
            transport: TransportConfig::default(),
        }
    }

    fn animation(&self) -> Duration { Duration::from_millis(self.animation_ms) }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let args = Args::parse();
    if args.simulate {
        let user_id = UserId::from(args.user_id.as_deref().unwrap_or(simulate::DEMO_USER));
        return simulate::run(user_id, args.config(), args.animation()).await;
    }

    let Some(user_id) = args.user_id.as_deref().map(UserId::from) else {
        anyhow::bail!("--user-id (or PUNCHCARD_USER_ID) is required unless --simulate is given");
    };
    let config = args.config();
    let transport = Arc::new(WebsocketTransport::new(&args.server_url, config.transport.clone())?);
    let runtime = WalletRuntime::new(transport.clone(), config);
    let _presenter = HeadlessPresenter::start(runtime.presentation(), args.animation());
    let _status = transport.on_connection_change(Box::new(|status: ConnectionStatus| info!("connection: {}", status)));

    runtime.login(user_id);
    info!("wallet running against {}; press ctrl-c to quit", transport.server_url());
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    transport.shutdown().await;
    Ok(())
}
