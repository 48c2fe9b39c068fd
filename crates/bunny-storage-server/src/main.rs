use bunny_storage_server::Zone;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "bunny-storage-server",
    about = "In-memory storage zone emulator"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8322)]
    port: u16,

    /// Storage zone name served under `/{zone}/`.
    #[arg(long, default_value = "test-zone")]
    zone: String,

    /// Password clients must send in the `AccessKey` header.
    #[arg(long, env = "BUNNY_ACCESS_KEY")]
    access_key: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting bunny-storage-server on {addr}");
    info!("zone endpoint: http://{addr}/{}", cli.zone);

    let zone = Arc::new(Zone::new(&cli.zone, &cli.access_key));
    if let Err(e) = bunny_storage_server::run_server(&zone, &addr) {
        error!("server failed: {e}");
        std::process::exit(1);
    }
}
