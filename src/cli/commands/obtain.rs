/// `certforge obtain`
use crate::challenge::{ChallengeResponder, ManualDnsResponder, WebrootResponder};
use crate::cli::args::ObtainArgs;
use crate::cli::commands::apply_directory;
use crate::config::{EngineConfig, OrderSpec};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::types::{AccountStatus, ChallengeKind};
use std::sync::Arc;

pub async fn run(config: EngineConfig, args: ObtainArgs) -> Result<()> {
    let mut config = apply_directory(config, args.directory.as_deref(), args.staging);
    config.allow_invalid_tls = config.allow_invalid_tls || args.allow_invalid_tls;
    if let Some(email) = &args.email {
        config.contact_email = Some(email.clone());
    }

    let challenges = args
        .challenges
        .iter()
        .map(|c| c.parse::<ChallengeKind>().map_err(EngineError::config))
        .collect::<Result<Vec<_>>>()?;

    let responder: Arc<dyn ChallengeResponder> = match &args.webroot {
        Some(webroot) => Arc::new(WebrootResponder::new(webroot)),
        None => Arc::new(ManualDnsResponder),
    };

    let engine = Engine::connect(config, responder).await?;

    // Register on first use; subsequent runs reuse the stored account.
    if engine.accounts().account_url().await.is_err() {
        let email = args.email.as_deref().ok_or_else(|| {
            EngineError::config("--email is required the first time an account is registered")
        })?;
        engine.accounts().register(email, true).await?;
    } else if engine.accounts().status().await? != AccountStatus::Valid {
        return Err(EngineError::account_invalid(
            "Stored account is no longer valid; register again with a fresh key",
        ));
    }

    let mut spec = OrderSpec::new(&args.domain)
        .with_key_alg(args.key_alg.parse().map_err(EngineError::config)?)
        .with_pfx_password(&args.password);
    for san in &args.subject_alternative_names {
        spec = spec.with_san(san);
    }
    spec.challenge_preferences = challenges;
    spec.order_resume_uri = args.resume_order.clone();
    spec.dns_propagation_delay_secs = args.propagation_delay;

    if let Some(csr_file) = &args.csr_file {
        spec.custom_csr_pem = Some(tokio::fs::read_to_string(csr_file).await?);
    }
    if let Some(key_file) = &args.key_file {
        spec.custom_private_key_pem = Some(tokio::fs::read_to_string(key_file).await?);
    }

    let artifact = engine.issue(&spec).await?;
    println!("{}", artifact.path.display());
    Ok(())
}
