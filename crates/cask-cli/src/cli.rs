use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cask",
    about = "Cask — HTTP gateway for a versioned object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<String>,

    /// Bind address, overriding the configuration file
    #[arg(long)]
    pub bind: Option<String>,

    /// Storage root path, overriding the configuration file
    #[arg(long)]
    pub root: Option<String>,
}
