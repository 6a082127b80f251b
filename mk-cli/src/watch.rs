use std::sync::Arc;

use kube::config::Kubeconfig;
use mk_contexts::{
    ContextsManager,
    KubeClientProvider,
};
use mk_core::errors::*;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{
    Duration,
    interval,
};
use tracing::*;

#[derive(clap::Args)]
pub struct Args {
    #[arg(short, long, long_help = "manager config file; the built-in defaults are used if unset")]
    pub config: Option<String>,

    #[arg(long, long_help = "how often to re-read the kubeconfig", default_value_t = 10)]
    pub kubeconfig_reload_seconds: u64,
}

// Returns the kubeconfig's serialized form when it differs from what was last applied
fn changed_kubeconfig(last: Option<&str>) -> anyhow::Result<Option<(Kubeconfig, String)>> {
    let kubeconfig = Kubeconfig::read()?;
    let rendered = serde_yaml::to_string(&kubeconfig)?;
    Ok((last != Some(rendered.as_str())).then_some((kubeconfig, rendered)))
}

pub async fn cmd(args: &Args) -> EmptyResult {
    let config = crate::load_config(args.config.as_deref())?;
    let mut manager = ContextsManager::start(&config, Arc::new(KubeClientProvider::default()))?;
    let mut updates = manager.subscribe_states();
    let mut reload = interval(Duration::from_secs(args.kubeconfig_reload_seconds.max(1)));
    let mut last: Option<String> = None;

    let res = loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break Ok(());
            },
            _ = reload.tick() => match changed_kubeconfig(last.as_deref()) {
                Ok(Some((kubeconfig, rendered))) => match manager.update(&kubeconfig) {
                    Ok(()) => {
                        info!("applied kubeconfig with {} contexts", kubeconfig.contexts.len());
                        last = Some(rendered);
                    },
                    Err(err) => warn!("ignoring kubeconfig: {err:#}"),
                },
                Ok(None) => (),
                Err(err) => warn!("could not read kubeconfig: {err:#}"),
            },
            update = updates.recv() => match update {
                Ok(update) => match serde_json::to_string(&update) {
                    Ok(line) => println!("{line}"),
                    Err(err) => break Err(err.into()),
                },
                Err(RecvError::Lagged(n)) => warn!("fell behind, skipped {n} state updates"),
                Err(RecvError::Closed) => break Err(anyhow!("state updates channel closed")),
            },
        }
    };

    manager.dispose().await?;
    res
}
