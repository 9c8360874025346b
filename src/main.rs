use clap::Parser;
use forum_pilot::cli::{Cli, Command};
use forum_pilot::config::Config;
use forum_pilot::types::RunStatus;
use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        timezone = %cfg.basic.timezone,
        sites = cfg.sites.len(),
    );

    match cli.command() {
        Command::Serve => forum_pilot::app::serve(cfg).await?,
        Command::Run { plugin, dry } => {
            let outcome = forum_pilot::app::run_once(&cfg, plugin, *dry).await?;
            println!("[{}] {}", outcome.status.as_str(), plugin);
            println!("{}", outcome.summary);
            if outcome.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Command::Totp => {
            let sheet = forum_pilot::app::totp_sheet(&cfg).await?;
            if sheet.codes.is_empty() {
                println!("no TOTP secrets stored or configured");
            }
            for c in sheet.codes {
                let label = if c.issuer.is_empty() {
                    c.account
                } else {
                    format!("{}:{}", c.issuer, c.account)
                };
                println!("{label:<40} {} ({:>2}s)", c.code, c.remaining);
            }
        }
        Command::Check => {
            let enabled: Vec<_> = forum_pilot::plugins::build_all(&cfg)
                .iter()
                .map(|p| p.id())
                .collect();
            println!(
                "configuration ok: {} site(s), enabled plugins: {}",
                cfg.sites.len(),
                if enabled.is_empty() { "-".to_string() } else { enabled.join(", ") }
            );
        }
    }
    Ok(())
}
