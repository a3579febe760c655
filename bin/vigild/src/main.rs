use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use log::LevelFilter;
use vigil_sentinel::Controller;
use vigil_sentinel::Options;

#[derive(Parser)]
#[command(author, version, about = "Runs one vigil sentinel")]
struct Cli {
    /// Path to the TOML options file shared by the deployment
    #[arg(short, long)]
    config: PathBuf,

    /// This sentinel's id, an index into the configured endpoint table
    #[arg(short, long)]
    sentinel_id: u32,

    /// Overrides the configured log verbosity for this sentinel
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn setup_logging(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let opts = Options::load(&cli.config)?;
    let level = cli
        .log_level
        .unwrap_or_else(|| opts.log_level_for(cli.sentinel_id));
    setup_logging(level)?;

    let controller = Arc::new(Controller::new(cli.sentinel_id, opts).await?);

    tokio::select! {
        served = controller.serve() => served?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
