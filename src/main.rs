use std::net::{IpAddr, SocketAddr};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use ubi_sandbox::core::PopulationModel;

#[derive(Parser, Debug)]
#[command(
    name = "ubi-sandbox",
    version,
    about = "Interactive UBI + tax policy sandbox over a four-bracket toy economy"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the interactive view over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(env = "PORT", default_value_t = 8080, help = "Port to listen on")]
    port: u16,
    #[arg(
        long,
        env = "UBI_SANDBOX_BIND",
        default_value = "0.0.0.0",
        help = "Address to bind"
    )]
    bind: IpAddr,
    #[arg(
        long,
        env = "UBI_SANDBOX_LOG",
        default_value = "info",
        help = "Log level when RUST_LOG is unset"
    )]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let Command::Serve(args) = cli.command;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), args.log_level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting UBI policy sandbox v{}", env!("CARGO_PKG_VERSION"));

    let addr = SocketAddr::new(args.bind, args.port);
    if let Err(e) = ubi_sandbox::api::run_http_server(addr, PopulationModel::reference()).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}
