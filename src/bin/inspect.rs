//! blockpack Inspect Binary
//!
//! Dumps shard headers, blocks and chains of an existing store.

use std::path::PathBuf;

use blockpack::{Engine, PackError, RawCodec, ShardId};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// blockpack store inspector
#[derive(Parser, Debug)]
#[command(name = "blockpack-inspect")]
#[command(about = "Inspect the shard files of a blockpack store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./blockpack_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header of every shard
    Stat,

    /// List every block of a shard
    Blocks {
        /// Shard id
        #[arg(short, long)]
        shard: ShardId,
    },

    /// Print the blocks of one chain
    Chain {
        /// Shard id
        #[arg(short, long)]
        shard: ShardId,

        /// Offset of the chain's first block
        #[arg(short, long, default_value = "12")]
        offset: u64,

        /// Also print every record (lossy UTF-8)
        #[arg(short, long)]
        records: bool,
    },

    /// List the head offsets of all chains in a shard
    Heads {
        /// Shard id
        #[arg(short, long)]
        shard: ShardId,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,blockpack=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("blockpack-inspect v{}", blockpack::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> blockpack::Result<()> {
    if !args.data_dir.is_dir() {
        return Err(PackError::Config(format!(
            "{} is not a directory",
            args.data_dir.display()
        )));
    }

    // Only the shard files already present are opened, read-only
    let engine = Engine::open_existing(&args.data_dir, RawCodec)?;

    match args.command {
        Command::Stat => {
            println!("{:>6} {:>14} {:>8}", "shard", "cursor", "blocks");
            for shard in engine.shards().shard_ids() {
                let header = engine.shards().header(shard)?;
                println!("{:>6} {:>14} {:>8}", shard, header.cursor, header.block_count);
            }
            println!("total blocks: {}", engine.total_blocks());
        }
        Command::Blocks { shard } => {
            println!("{:>14} {:>6} {:>10} {:>8} {:>14}", "offset", "class", "capacity", "records", "next");
            for item in engine.iter(shard)? {
                let (offset, block) = item?;
                println!(
                    "{:>14} {:>6} {:>10} {:>8} {:>14}",
                    offset,
                    block.class().tag(),
                    block.capacity(),
                    block.len(),
                    block.next_pointer()
                );
            }
        }
        Command::Chain {
            shard,
            offset,
            records,
        } => {
            let blocks = engine.read_chain(shard, offset)?;
            let mut position = offset;
            for (i, block) in blocks.iter().enumerate() {
                println!(
                    "block {} @ {}: {}, {} records, {} bytes free, next {}",
                    i,
                    position,
                    block.class(),
                    block.len(),
                    block.free_bytes(),
                    block.next_pointer()
                );
                if records {
                    for record in block.records() {
                        println!("  {}", String::from_utf8_lossy(record));
                    }
                }
                position = block.next_pointer();
            }
            let total: usize = blocks.iter().map(|b| b.len()).sum();
            println!("{} blocks, {} records", blocks.len(), total);
        }
        Command::Heads { shard } => {
            for head in engine.chain_heads(shard)? {
                println!("{}", head);
            }
        }
    }

    Ok(())
}
