use std::path::PathBuf;

use anyhow::Context as _;
use tether::net::{TokioRetryTimer, WebSocketTransport};
use tether::{ClientConfig, Session, SessionEvent};
use tokio::sync::mpsc::unbounded_channel;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let url_override = std::env::args().nth(1);

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config_path = std::env::var("TETHER_CONFIG").ok().map(PathBuf::from);
    let config = ClientConfig::load(config_path).context("loading client configuration")?;
    let url = config
        .server_url(url_override.as_deref())
        .context("resolving server URL")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    rt.block_on(async move {
        let (events_tx, events_rx) = unbounded_channel();
        let transport = WebSocketTransport::new(url.clone(), events_tx.clone());
        let timer = TokioRetryTimer::new(events_tx.clone());
        let mut session = Session::new(&config, transport, timer)?;

        info!(target = "session", url = %url, "starting session");
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = events_tx.send(SessionEvent::Shutdown);
            }
        });
        session.run(events_rx).await;
        Ok::<(), anyhow::Error>(())
    })
}
