/// `certforge revoke`
use crate::challenge::ManualDnsResponder;
use crate::cli::args::RevokeArgs;
use crate::cli::commands::apply_directory;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::types::RevocationReason;
use std::sync::Arc;

pub async fn run(config: EngineConfig, args: RevokeArgs) -> Result<()> {
    let config = apply_directory(config, args.directory.as_deref(), args.staging);

    let reason = args
        .reason
        .as_deref()
        .map(|r| r.parse::<RevocationReason>().map_err(EngineError::config))
        .transpose()?;

    let engine = Engine::connect(config, Arc::new(ManualDnsResponder)).await?;
    engine.revoke(&args.pfx, &args.password, reason).await?;

    println!("revoked {}", args.pfx.display());
    Ok(())
}
