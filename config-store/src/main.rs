use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use config_store::{
    cli::{Cli, Command, KeyArgs, ServeArgs, StoreArgs},
    client::StoreClient,
    protocol::StoreResponse,
    server::Server,
    service::{ServiceHandle, StoreService},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let succeeded = match cli.command {
        Command::Serve(args) => {
            serve(args).await?;
            true
        }
        Command::Store(StoreArgs {
            key,
            value,
            connection,
        }) => {
            let mut client = StoreClient::connect(connection.server).await?;
            report(client.store(&key, value).await?)
        }
        Command::Load(KeyArgs { key, connection }) => {
            let mut client = StoreClient::connect(connection.server).await?;
            report(client.load(&key).await?)
        }
        Command::Erase(KeyArgs { key, connection }) => {
            let mut client = StoreClient::connect(connection.server).await?;
            report(client.erase(&key).await?)
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(args: ServeArgs) -> Result<()> {
    // Bind before touching the snapshot: a store that can't listen exits
    // without loading or saving anything.
    let server = Server::bind(args.listen).await?;
    let addr = server.local_addr()?;

    let service = StoreService::open(&args.store_config());
    let handle = ServiceHandle::spawn(service);
    info!("listening on {}", addr);

    let served = server.run_until_shutdown_signal(handle.requests()).await;
    if let Err(err) = &served {
        warn!("server exited with error: {err:?}");
    }

    handle.stop().await?;
    served
}

fn report(response: StoreResponse) -> bool {
    if response.success {
        if !response.data.is_empty() {
            println!("{}", String::from_utf8_lossy(&response.data));
        }
    } else {
        println!("*** request for '{}' failed", response.key);
    }
    response.success
}
