use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge::chain::{audit, Chain, Operation};
use forge::config::AppConfig;
use forge::ots::{OtsClient, UpgradeOutcome};
use forge::store::{FileStore, Store};
use forge::witness;

fn cli() -> Command {
    Command::new("forge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Tamper-evident operational audit log with Bitcoin anchoring")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("log")
                .about("Record an operation on the chain")
                .arg(Arg::new("action").required(true).help("Action description"))
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("JSON")
                        .help("Pre-state snapshot as JSON"),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("JSON")
                        .help("Post-state snapshot as JSON"),
                ),
        )
        .subcommand(Command::new("verify").about("Verify chain and block integrity"))
        .subcommand(Command::new("seal").about("Seal unsealed atoms into a Merkle block"))
        .subcommand(
            Command::new("anchor")
                .about("Submit the latest sealed root to OpenTimestamps")
                .arg(
                    Arg::new("upgrade")
                        .long("upgrade")
                        .action(ArgAction::SetTrue)
                        .help("Poll calendars for a Bitcoin attestation instead"),
                ),
        )
        .subcommand(
            Command::new("witness")
                .about("Show or extend the witness record of the latest sealed root")
                .arg(
                    Arg::new("bilateral")
                        .long("bilateral")
                        .value_name("ID")
                        .help("Record a bilateral receipt with this counterparty"),
                )
                .arg(
                    Arg::new("root")
                        .long("root")
                        .value_name("HASH")
                        .help("Merkle root to inspect (default: latest sealed)"),
                ),
        )
        .subcommand(Command::new("status").about("Summarise the chain and its witnesses"))
        .subcommand(Command::new("export").about("Print the shareable chain export as JSON"))
        .subcommand(
            Command::new("history")
                .about("Show recent operations with local plaintext")
                .arg(
                    Arg::new("count")
                        .value_name("N")
                        .help("Number of entries (default 10)"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = cli().get_matches();
    let config = AppConfig::load();
    let store = FileStore::open(&config.home)?;
    let mut chain = Chain::new(&config.identity, store)?;

    match matches.subcommand() {
        Some(("log", sub)) => {
            let action = sub
                .get_one::<String>("action")
                .ok_or_else(|| anyhow!("missing action"))?;
            let op = Operation {
                action: action.clone(),
                from: parse_snapshot(sub.get_one::<String>("from"))?,
                to: parse_snapshot(sub.get_one::<String>("to"))?,
            };
            let atom = chain.record(&op)?;
            let index = chain.store().atom_count()? - 1;
            println!("✓ recorded atom {} as index {}", atom.proof, index);
        }
        Some(("verify", _)) => {
            let report = audit::inspect(chain.store())?;
            println!("{}", report.detailed_status());
            if !report.is_valid() {
                return Err(anyhow!("chain verification failed"));
            }
            println!("✓ chain verified");
        }
        Some(("seal", _)) => match chain.seal()? {
            Some(block) => println!(
                "✓ sealed atoms {}..={} into block {} (root {})",
                block.atom_range.0, block.atom_range.1, block.block_hash, block.root
            ),
            None => println!("nothing to seal"),
        },
        Some(("anchor", sub)) => {
            let root = latest_root(&chain)?;
            let client = OtsClient::new(config.calendars.clone())?;

            if sub.get_flag("upgrade") {
                match client.check_upgrade(chain.store_mut(), &root).await? {
                    UpgradeOutcome::NoPending => {
                        println!("no pending submission for {}; run `forge anchor` first", root)
                    }
                    UpgradeOutcome::Pending { checked, errors } => println!(
                        "still pending: {} calendar(s) checked, {} error(s)",
                        checked, errors
                    ),
                    UpgradeOutcome::Confirmed {
                        new_level,
                        attestations,
                    } => println!(
                        "✓ Bitcoin attestation from {} calendar(s); root {} is now level {}",
                        attestations, root, new_level
                    ),
                }
            } else {
                let receipt = client.submit(chain.store_mut(), &root).await?;
                println!(
                    "✓ root {} submitted to {}/{} calendars",
                    root, receipt.successful_submissions, receipt.total_calendars
                );
                if receipt.successful_submissions == 0 {
                    return Err(anyhow!("every calendar submission failed"));
                }
            }
        }
        Some(("witness", sub)) => {
            let root = match sub.get_one::<String>("root") {
                Some(r) => r.clone(),
                None => latest_root(&chain)?,
            };

            if let Some(counterparty) = sub.get_one::<String>("bilateral") {
                let receipt =
                    witness::create_bilateral_witness(chain.store_mut(), &root, counterparty)?;
                println!(
                    "✓ bilateral receipt {} recorded with {}",
                    receipt.receipt_hash, counterparty
                );
            }

            let summary = witness::witness_summary(chain.store(), &root)?;
            println!("root: {}", summary.merkle_root);
            println!(
                "level: {} ({}), {} witness(es)",
                summary.level, summary.label, summary.witness_count
            );
            for view in &summary.witnesses {
                println!("  - {}", view);
            }
            if !summary.upgrade_path.is_empty() {
                println!("upgrade path:");
                for step in &summary.upgrade_path {
                    println!("  - {}", step);
                }
            }
        }
        Some(("status", _)) => {
            let status = chain.status()?;
            println!("identity: {} ({})", chain.identity(), status.identity_hash);
            println!(
                "atoms: {} ({} unsealed), blocks: {}",
                status.atom_count, status.unsealed_atoms, status.block_count
            );
            println!("head: {}", status.last_proof);
            for block in chain.store().get_blocks()? {
                let level = witness::witness_level(chain.store(), &block.root)?;
                println!(
                    "  block {}..={} root {} level {} ({})",
                    block.atom_range.0, block.atom_range.1, block.root, level.level, level.label
                );
            }
        }
        Some(("export", _)) => {
            let export = chain.export()?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        Some(("history", sub)) => {
            let count = match sub.get_one::<String>("count") {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|_| anyhow!("invalid count: {}", raw))?,
                None => 10,
            };
            for row in chain.store().get_history(count)? {
                let text = row.action_text.as_deref().unwrap_or("<no local plaintext>");
                println!("{:>5}  {}  {}  {}", row.index, row.when, row.proof, text);
            }
        }
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}

fn parse_snapshot(raw: Option<&String>) -> Result<Option<serde_json::Value>> {
    match raw {
        Some(text) => {
            let value = serde_json::from_str(text)
                .map_err(|e| anyhow!("invalid snapshot JSON {:?}: {}", text, e))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn latest_root(chain: &Chain<FileStore>) -> Result<String> {
    let blocks = chain.store().get_blocks()?;
    blocks
        .last()
        .map(|b| b.root.clone())
        .ok_or_else(|| anyhow!("no sealed block yet; run `forge seal` first"))
}
