use std::sync::Arc;

use anyhow::Context;
use cask_server::{GatewayConfig, GatewayServer};
use cask_store::InMemoryObjectStore;

use crate::cli::{Cli, Command, ServeArgs};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => {
            GatewayConfig::load(path).with_context(|| format!("loading configuration {path}"))?
        }
        None => GatewayConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.parse().context("invalid bind address")?;
    }
    if let Some(root) = &args.root {
        config.storage_root = root.into();
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = config.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.build().context("building runtime")?;

    let store = Arc::new(InMemoryObjectStore::new());
    let server = GatewayServer::new(config, store);
    runtime.block_on(server.serve()).map_err(Into::into)
}
