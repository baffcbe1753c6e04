use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use curator::api::{AppState, router, wait_for_shutdown};
use curator::core::config::{self, CliOverrides};
use curator::core::logging;
use curator::inference::{AiProvider, ChatMessage, CompletionOptions, ProviderManager};

#[derive(Parser)]
#[command(name = "curator", about = "AI provider health and fallback service")]
struct Args {
    /// Config file to use instead of ~/.curator/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Runtime environment (development, production, test)
    #[arg(short, long)]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the health routes over HTTP (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Probe every provider once and print the aggregate as JSON
    Health,
    /// Send a short prompt to one provider
    Test {
        /// Registry key, e.g. "openai"
        provider: String,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List the models a provider offers
    Models { provider: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let command = args.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });
    let overrides = match &command {
        Command::Serve { host, port } => CliOverrides {
            host: host.clone(),
            port: *port,
            environment: args.env.clone(),
        },
        _ => CliOverrides {
            environment: args.env.clone(),
            ..CliOverrides::default()
        },
    };

    let file_config = config::load_config(args.config.as_deref())?;
    let resolved = config::resolve(&file_config, &overrides)?;
    logging::init(resolved.log_level, resolved.log_file.as_deref())?;

    log::info!(
        "Curator starting up (environment: {})",
        resolved.environment
    );

    let manager = Arc::new(ProviderManager::from_config(&resolved.providers)?);

    match command {
        Command::Serve { .. } => {
            manager.perform_health_checks().await;

            let app = router(AppState::new(Arc::clone(&manager), resolved.environment));
            let listener =
                tokio::net::TcpListener::bind((resolved.host.as_str(), resolved.port)).await?;
            log::info!("Health routes listening on {}", listener.local_addr()?);

            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_shutdown(tokio::signal::ctrl_c()))
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            manager.perform_health_checks().await;
            let health = manager.get_aggregated_health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(if health.healthy {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Test { provider, message } => {
            let provider = lookup(&manager, &provider)?;
            let message = message
                .unwrap_or_else(|| curator::api::types::DEFAULT_TEST_MESSAGE.to_string());
            let options = CompletionOptions::default()
                .with_max_tokens(50)
                .with_temperature(0.0);

            let completion = provider
                .generate_completion(&[ChatMessage::user(message)], &options)
                .await?;
            println!("{}: {}", provider.name(), completion.content);
            if let Some(usage) = completion.usage {
                println!(
                    "tokens: {} in, {} out",
                    usage.input_tokens, usage.output_tokens
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Models { provider } => {
            let provider = lookup(&manager, &provider)?;
            for model in provider.models().await? {
                println!("{model}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn lookup(manager: &ProviderManager, key: &str) -> Result<Arc<dyn AiProvider>, Box<dyn Error>> {
    manager.get_provider(key).ok_or_else(|| {
        format!(
            "Provider '{key}' not found (available: {})",
            manager.get_provider_names().join(", ")
        )
        .into()
    })
}
