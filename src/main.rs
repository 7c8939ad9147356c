use clap::{Parser, Subcommand};
use n8n_automation::config::ConfigArgs;
use n8n_automation::driver::ChromeLauncher;
use n8n_automation::server::{self, AppState};
use n8n_automation::workflow::{definitions, Orchestrator};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Port the HTTP API listens on
    #[arg(short, long, global = true, env = "N8N_AUTOMATION_PORT", default_value_t = 8000)]
    port: u16,

    /// Address the HTTP API binds
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: IpAddr,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Run one workflow and print its result as JSON
    Run {
        /// extract-credential-value or create-oauth-credential
        workflow: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.config.into_config();

    let orchestrator = Orchestrator::new(
        ChromeLauncher::new(config.session.clone()),
        config.session.grace,
    );
    #[cfg(feature = "clipboard")]
    let orchestrator =
        orchestrator.with_clipboard(Arc::new(n8n_automation::clipboard::SystemClipboard));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            log::info!("Starting n8n automation service on port {}", args.port);
            let state = Arc::new(AppState::new(orchestrator, config));
            if let Err(e) = server::serve(state, SocketAddr::new(args.host, args.port)).await {
                log::error!("{}", e);
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Command::Run { workflow } => {
            let Some(workflow) = definitions::by_name(&workflow, &config.target, &config.timing)
            else {
                anyhow::bail!(
                    "Unknown workflow '{}' (expected {} or {})",
                    workflow,
                    definitions::EXTRACT_CREDENTIAL_VALUE,
                    definitions::CREATE_OAUTH_CREDENTIAL
                );
            };

            let result = orchestrator.run(&workflow).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_completed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
