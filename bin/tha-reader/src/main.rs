//! Interactive archive inspection: `p <hex64>` prints a transaction,
//! `d <hex64>` deletes it and its status timeline, `q` quits.

use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use vigil_archive::render_tx;
use vigil_archive::ArchiveConfig;
use vigil_archive::TxHistoryArchiver;
use vigil_common::parse_hash;
use vigil_sentinel::Options;

#[derive(Parser)]
#[command(author, version, about = "Reads and prunes the transaction history archive")]
struct Cli {
    /// Sentinel options file to take the archive settings from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of an embedded archive store, used when no config is given
    #[arg(short, long, default_value = "tha_test")]
    datadir: String,
}

fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
        })
        .level(LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging()?;

    let archive_config = match &cli.config {
        Some(path) => Options::load(path)?.archive,
        None => ArchiveConfig {
            backend: "leveldb".into(),
            parameter: cli.datadir.clone(),
            ..ArchiveConfig::default()
        },
    };

    let archiver = TxHistoryArchiver::new(0, &archive_config).await;

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.as_slice() {
            ["q"] => {
                println!("Exit");
                return Ok(());
            }
            [command, txid] if *command == "p" || *command == "d" => {
                let Some(hash) = parse_hash(txid) else {
                    usage();
                    continue;
                };

                if *command == "p" {
                    match archiver.get(&hash).await {
                        Some((state, tx, timestamp)) => {
                            println!("Read TX: {}", render_tx(&tx, state, timestamp));
                        }
                        None => println!("Transaction with ID {txid} not found"),
                    }
                } else if archiver.delete(&hash).await > 0 {
                    println!("Transaction deleted.");
                } else {
                    println!("Transaction with ID {txid} not found");
                }
            }
            _ => usage(),
        }
    }

    Ok(())
}

fn usage() {
    println!(
        "Enter valid command (d for delete, p for print, q for quit) followed by \
         hexadecimal transaction Id"
    );
}
