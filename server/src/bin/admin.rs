#![expect(clippy::print_stdout, reason = "command line output")]

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    std::path::PathBuf,
    toolbelt_protocol::{FieldKey, JwtSecret},
    toolbelt_server::{
        config::{Config, MEMORY_DATABASE},
        store::{PgStore, Store},
    },
};

#[derive(Debug, Parser)]
pub struct Cli {
    /// Server config file. Required by the commands that touch the database.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Print a fresh key for `NOTE_ENC_KEY`.
    GenerateKey,
    /// Print a fresh secret for `JWT_SECRET` or `JWT_REFRESH_SECRET`.
    GenerateSecret,
    /// Print the number of registered users.
    Users,
}

async fn connect(config: Option<&PathBuf>) -> Result<PgStore> {
    let path = config.context("--config is required for this command")?;
    let config = Config::parse(path)?;
    if config.database_url == MEMORY_DATABASE {
        anyhow::bail!("the in-memory store has nothing to administer");
    }
    PgStore::connect(&config.database_url).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Migrate => {
            let store = connect(cli.config.as_ref()).await?;
            println!("Running migrations...");
            store.migrate().await?;
            println!("Done");
        }
        Command::GenerateKey => {
            println!("{}", FieldKey::generate().display_unmasked());
        }
        Command::GenerateSecret => {
            println!("{}", JwtSecret::generate().as_unmasked_str());
        }
        Command::Users => {
            let store = connect(cli.config.as_ref()).await?;
            let count = store.count_users().await?;
            println!("{count} registered users");
        }
    }
    Ok(())
}
