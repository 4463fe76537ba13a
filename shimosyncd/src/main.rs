use std::path::PathBuf;

use shimosyncd::daemon::{DaemonConfig, DaemonRuntime};
use shimosyncd::logging::init_logging;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run { config: Option<PathBuf> },
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{arg} requires a path"))?;
                config = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Ok(CliMode::Help),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(CliMode::Run { config })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config_override = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: shimosyncd [--config PATH]");
            println!("  --config PATH   Settings file (default: $SHIMO_CONFIG or config.json)");
            return Ok(());
        }
        CliMode::Run { config } => config,
    };

    let mut config = DaemonConfig::from_env();
    if let Some(path) = config_override {
        config.config_path = path;
    }
    let daemon = DaemonRuntime::bootstrap(config).await?;
    daemon.run().await?;
    Ok(())
}
