use audiowallet_host::Host;
use audiowallet_host::config::{CliArgs, HostConfig};
use audiowallet_host::error::HostError;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    let config = match HostConfig::resolve(args) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to resolve configuration: {}", err);
            std::process::exit(1);
        }
    };

    let bind_address = config.listen_address();
    let host = Host::new(config);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = HostError::Bind {
                addr: bind_address,
                source,
            };
            error!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = host.serve(listener, shutdown_signal()).await {
        error!("host server exited: {}", err);
    }
    host.shutdown().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
