//! Agent binary: loads device sources and credentials, then serves the
//! JSON-RPC surface over HTTP.
//!
//! Exit codes match the original agent's: 0 normal shutdown, 1 config
//! error, 2 bind error, 3 keyboard interrupt.

use std::process::ExitCode;

use clap::Parser;

use notch::config::{AgentConfig, DeviceSource};
use notch::controller::Controller;
use notch::credentials::Credentials;
use notch::registry::dns_txt::{BlockingDnsTxtProvider, DnsTxtProvider};
use notch::registry::routerdb::RouterDbProvider;
use notch::registry::{Provider, Registry};
use notch::rpc::{self, DispatchMode, RpcState};

#[derive(Parser, Debug)]
#[command(name = "notch-agent")]
struct Args {
    #[arg(long, default_value = "/etc/notch/agent.yaml")]
    config: String,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = match AgentConfig::load_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("config error: {e}");
            return ExitCode::from(1);
        }
    };

    let credentials = match Credentials::load_file(&config.options.credentials_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("credential error: {e}");
            return ExitCode::from(1);
        }
    };

    let mut providers: Vec<Box<dyn Provider>> = Vec::new();
    for source in &config.device_sources {
        match source {
            DeviceSource::RouterDb { path, ignore_down_devices } => {
                match RouterDbProvider::load_file(path, *ignore_down_devices) {
                    Ok(provider) => providers.push(Box::new(provider)),
                    Err(e) => {
                        log::error!("router.db load failed ({path}): {e}");
                        return ExitCode::from(1);
                    }
                }
            }
            DeviceSource::DnsTxt => match DnsTxtProvider::new() {
                Ok(provider) => {
                    providers.push(Box::new(BlockingDnsTxtProvider::new(provider)));
                    log::info!("dns_txt source configured");
                }
                Err(e) => {
                    log::error!("dns resolver init failed: {e}");
                    return ExitCode::from(1);
                }
            },
        }
    }

    let registry = Registry::new(providers);
    let controller = Controller::with_capacity(
        registry,
        credentials,
        config.options.max_active_sessions,
        std::time::Duration::from_secs(config.options.timers.max_idle_secs),
    );
    controller.spawn_idle_sweeper(std::time::Duration::from_secs(config.options.timers.session_maint_period));

    let port = args.port.unwrap_or(config.options.port);
    let state = RpcState::new(controller.clone(), DispatchMode::default());
    let app = rpc::router(state);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("bind error on port {port}: {e}");
            return ExitCode::from(2);
        }
    };

    log::info!("notch-agent listening on {port}{}", rpc::RPC_PATH);
    let serve = axum::serve(listener, app);
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                log::error!("server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received interrupt, disconnecting sessions");
            controller.disconnect_all().await;
            return ExitCode::from(3);
        }
    }

    ExitCode::from(0)
}
