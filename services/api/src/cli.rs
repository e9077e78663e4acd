use crate::lookup::{run_lookup, LookupArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use pasantia::config::AppConfig;
use pasantia::db;
use pasantia::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "pasantia-api",
    about = "Serve and operate the internship exemption request service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the state, documents and history of one application
    Lookup(LookupArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => run_migrations().await,
        Command::Lookup(args) => run_lookup(args).await,
    }
}

async fn run_migrations() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let pool = db::connect(&config.database).await?;
    db::migrate(&pool).await?;
    println!("Migrations applied to {}", config.database.url);
    Ok(())
}
