use std::io::BufRead;

use clap::Parser;
use postgate::app_state::AppState;
use postgate::http::setup_http_server;
use postgate::init_telemetry;
use tokio::time::sleep;
use tracing::info;

#[derive(Parser)]
#[command(name = "postgate")]
#[command(about = "Versioned, authenticated and rate-limited JSON API for a blog")]
#[clap(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
enum Commands {
    /// Show current configuration and exit
    Config,
    /// Start the API server (default)
    Run,
    /// Delete every cached response and exit
    PurgeCache,
    /// Print a bcrypt hash for a user's password_hash setting
    HashPassword {
        /// Read from stdin when omitted
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Config => {
            let app_state = AppState::new_for_config_only().await?;
            println!("{:#?}", &app_state.settings);
            return Ok(());
        }
        Commands::PurgeCache => {
            let app_state = AppState::new_for_config_only().await?;
            app_state.dispatcher.services().cache.purge_all().await?;
            println!("Response cache purged");
            return Ok(());
        }
        Commands::HashPassword { password } => {
            let password = match password {
                Some(password) => password.clone(),
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line.trim_end_matches(['\r', '\n']).to_string()
                }
            };
            println!("{}", bcrypt::hash(password, bcrypt::DEFAULT_COST)?);
            return Ok(());
        }
        Commands::Run => {}
    }

    let app_state = AppState::new().await?;
    init_telemetry::init_telemetry_and_tracing(
        &app_state.settings.telemetry,
        app_state.settings.telemetry_enabled(),
    )?;

    let mut handles = vec![];
    {
        let handle = setup_http_server(
            app_state.clone(),
            &app_state.settings.api.bind_address,
            app_state.settings.telemetry_enabled(),
        )
        .await?;
        handles.push(handle);
    }

    sleep(std::time::Duration::from_millis(100)).await;

    loop {
        handles.retain(|handle| !handle.is_finished());

        if handles.is_empty() {
            info!("All tasks are done");
            break;
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    }

    Ok(())
}
