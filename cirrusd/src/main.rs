use cirrusd::config::DaemonConfig;
use cirrusd::daemon::DaemonRuntime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Watch,
    Once,
    DryRun,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Watch;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--once" => mode = CliMode::Once,
            "--dry-run" => mode = CliMode::DryRun,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: cirrusd [--once | --dry-run]");
            println!("  --once      Replay pending changes, drain the queue, exit");
            println!("  --dry-run   Report what a one-shot sync would enqueue");
            Ok(())
        }
        CliMode::Once => {
            let config = DaemonConfig::from_env()?;
            let daemon = DaemonRuntime::bootstrap(config).await?;
            let enqueued = daemon.run_once(false).await?;
            println!("synced {enqueued} change(s)");
            Ok(())
        }
        CliMode::DryRun => {
            let config = DaemonConfig::from_env()?;
            let daemon = DaemonRuntime::bootstrap(config).await?;
            let enqueued = daemon.run_once(true).await?;
            println!("would sync {enqueued} change(s)");
            Ok(())
        }
        CliMode::Watch => {
            let config = DaemonConfig::from_env()?;
            let daemon = DaemonRuntime::bootstrap(config).await?;
            daemon.run().await
        }
    }
}
