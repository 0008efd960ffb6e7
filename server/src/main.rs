use {
    anyhow::Result,
    clap::Parser,
    std::path::PathBuf,
    toolbelt_server::{
        config::{Config, Secrets},
        run,
        util::setup_logger,
    },
};

/// Toolbelt API server.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Path to the JSON5 config file.
    #[arg(required_unless_present = "config_flag")]
    config: Option<PathBuf>,
    #[arg(long = "config", conflicts_with = "config")]
    config_flag: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(config_path) = cli.config.or(cli.config_flag) else {
        anyhow::bail!("missing config path");
    };
    let config = Config::parse(config_path)?;
    setup_logger(config.log_file.as_deref(), &config.log_filter)?;
    let secrets = Secrets::from_env()?;
    run(config, secrets).await
}
