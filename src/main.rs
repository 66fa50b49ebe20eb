use anyhow::{Context, Result};
use clap::Parser;
use roombridge::cli::{Cli, Commands, ConfigAction};
use roombridge::config::Config;
use roombridge::loopback::{LoopbackOptions, run_loopback};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    roombridge::logging::init(cli.verbose);

    match cli.command {
        Commands::Config { action } => {
            handle_config_command(action.unwrap_or(ConfigAction::Show), cli.config.as_deref())?;
        }
        Commands::Loopback {
            participants,
            duration,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let options = LoopbackOptions {
                participants,
                duration,
                params: config.transport,
            };
            let report = run_loopback(options).await?;

            println!("roombridge {} loopback", roombridge::version_string());
            println!("  participants joined: {}", report.joins);
            println!("  participants left:   {}", report.leaves);
            println!("  chunks delivered:    {}", report.chunks_delivered);
            println!("  delivery errors:     {}", report.delivery_errors);
            println!("  frames received:     {}", report.frames_received);
            println!("  packets sent:        {}", report.packets_sent);
            println!("  failed sends:        {}", report.failed_sends);
        }
    }

    Ok(())
}

/// Load configuration from file with environment overrides.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };

    let config = config.with_env_overrides()?;
    config.transport.validate()?;
    Ok(config)
}

fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut config = load_config(custom_path)?;
            if config.meeting.auth_token.is_some() {
                config.meeting.auth_token = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => match custom_path
            .map(std::path::Path::to_path_buf)
            .or_else(Config::default_path)
        {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine configuration directory"),
        },
    }
    Ok(())
}
