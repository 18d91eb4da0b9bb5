//! Thin CLI client: runs one command against one device through a single
//! configured agent backend and prints the (base64-decoded) result.

use clap::Parser;

use notch::client::{Backend, Connection, RoundRobin};

#[derive(Parser, Debug)]
#[command(name = "notch-client")]
struct Args {
    /// Agent address, host[:port]. Falls back to `NOTCH_AGENTS` (first
    /// entry) if omitted.
    #[arg(long)]
    agent: Option<String>,
    device: String,
    command: String,
    #[arg(long)]
    mode: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let agent = args.agent.unwrap_or_else(|| {
        std::env::var("NOTCH_AGENTS")
            .ok()
            .and_then(|v| v.split(',').next().map(str::to_string))
            .unwrap_or_else(|| "127.0.0.1:9999".to_string())
    });

    let backend = Backend::new(agent, notch::rpc::RPC_PATH);
    let connection = Connection::new(vec![backend], Box::new(RoundRobin::new(1)));

    match connection.command(&args.device, &args.command, args.mode.as_deref()).await {
        Ok(result) => {
            if let Some(encoded) = result.as_str() {
                match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded) {
                    Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                    Err(_) => println!("{result}"),
                }
            } else {
                println!("{result}");
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
