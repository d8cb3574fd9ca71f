/// `certforge account`
use crate::challenge::ManualDnsResponder;
use crate::cli::args::{AccountArgs, AccountCommands};
use crate::cli::commands::apply_directory;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;
use std::sync::Arc;

pub async fn run(config: EngineConfig, args: AccountArgs) -> Result<()> {
    let config = apply_directory(config, args.directory.as_deref(), args.staging);
    let engine = Engine::connect(config, Arc::new(ManualDnsResponder)).await?;

    match args.command {
        AccountCommands::Register { email } => {
            let account = engine.accounts().register(&email, true).await?;
            println!("{}", account.url);
        }
        AccountCommands::Status => {
            println!("{:?}", engine.accounts().status().await?);
        }
        AccountCommands::Update { email } => {
            engine.accounts().update(&email, true).await?;
            println!("updated");
        }
        AccountCommands::Deactivate => {
            engine.accounts().deactivate().await?;
            println!("deactivated");
        }
        AccountCommands::Rollover => {
            engine.accounts().rollover().await?;
            println!("rolled over");
        }
    }

    Ok(())
}
