use clap::Parser;
use pmp_chain_engine::cli::{self, Cli, Command};
use pmp_chain_engine::config::AppConfig;
use pmp_chain_engine::infrastructure::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Command::Serve => cli::serve::run(config).await,
        Command::Validate { path } => {
            logging::init_logging(&config.logging);
            cli::validate::run(&path).await
        }
    }
}
