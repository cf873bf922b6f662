use std::path::{Path, PathBuf};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{info, warn};
use rand::{Rng, RngCore};

use flashdev_core::{Geometry, ERASED_BYTE, LFS_ERR_OK};
use flashdev_store::{open_backend, BackendKind, BlockContext};

mod dump;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Medium {
    Mem,
    Disk,
}

#[derive(Parser)]
#[command(version, about = "Inspect and exercise flash filesystem block backends")]
struct Cli {
    #[arg(long, value_enum, default_value = "mem")]
    backend: Medium,
    /// Raw device or image, e.g. /dev/sdb or \\.\D:
    #[arg(long)]
    device: Option<PathBuf>,
    #[arg(long, default_value_t = 512)]
    block_size: u32,
    #[arg(long, default_value_t = 16)]
    block_count: u32,
    /// Refuse to open a device that is mounted or in use (Linux).
    #[arg(long)]
    exclusive: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Show geometry and medium capacity.
    Info,
    /// Hex-dump bytes from a block.
    Read {
        #[arg(long)]
        block: u32,
        #[arg(long, default_value_t = 0)]
        off: u32,
        /// Defaults to the rest of the block.
        #[arg(long)]
        size: Option<usize>,
    },
    /// Program bytes into a block, then sync.
    Prog {
        #[arg(long)]
        block: u32,
        #[arg(long, default_value_t = 0)]
        off: u32,
        #[arg(long, conflicts_with = "hex", required_unless_present = "hex")]
        text: Option<String>,
        #[arg(long)]
        hex: Option<String>,
    },
    /// Erase one block, or every block with --all.
    Erase {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        block: Option<u32>,
        #[arg(long)]
        all: bool,
    },
    /// Erase/program/read-back self test. Destroys data on the medium.
    Verify {
        /// Number of blocks to exercise (default: all).
        #[arg(long)]
        blocks: Option<u32>,
        /// Dump the whole medium to this file afterwards.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

fn backend_kind(cli: &Cli) -> anyhow::Result<BackendKind> {
    match cli.backend {
        Medium::Mem => Ok(BackendKind::Memory),
        Medium::Disk => {
            let path = cli
                .device
                .clone()
                .ok_or_else(|| anyhow!("--device is required with --backend disk"))?;
            if cli.exclusive {
                if cfg!(windows) {
                    warn!("--exclusive has no effect on Windows volumes");
                } else {
                    return Ok(BackendKind::LinuxDisk { path, exclusive: true });
                }
            }
            Ok(BackendKind::native_disk(path))
        }
    }
}

fn check(status: i32, what: &str) -> anyhow::Result<()> {
    if status != LFS_ERR_OK {
        bail!("{} failed with status {}", what, status);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let geometry = Geometry::new(cli.block_size, cli.block_count)?;
    let kind = backend_kind(&cli)?;
    info!("Opening {:?} with {} x {} byte blocks", kind, geometry.block_count, geometry.block_size);

    let backend = open_backend(&kind, &geometry).context("could not open backend")?;
    let mut ctx = BlockContext::new(geometry, backend);

    match cli.cmd {
        Cmd::Info => info_cmd(&ctx),
        Cmd::Read { block, off, size } => {
            let size = size.unwrap_or((geometry.block_size.saturating_sub(off)) as usize);
            let data = ctx.read(block, off, size)?;
            dump::hex(geometry.addr(block, off), &data);
        }
        Cmd::Prog { block, off, text, hex } => {
            let data = match (text, hex) {
                (Some(t), _) => t.into_bytes(),
                (None, Some(h)) => dump::parse_hex(&h)?,
                (None, None) => bail!("nothing to program"),
            };
            check(ctx.prog(block, off, &data), "prog")?;
            check(ctx.sync(), "sync")?;
            println!("programmed {} bytes at block {} offset {}", data.len(), block, off);
        }
        Cmd::Erase { block: Some(block), .. } => {
            check(ctx.erase(block), "erase")?;
            check(ctx.sync(), "sync")?;
            println!("erased block {}", block);
        }
        Cmd::Erase { block: None, .. } => erase_all(&mut ctx)?,
        Cmd::Verify { blocks, snapshot } => {
            if cli.backend == Medium::Disk {
                warn!("verify overwrites the device contents");
            }
            let n = blocks.unwrap_or(geometry.block_count).min(geometry.block_count);
            verify(&mut ctx, n)?;
            if let Some(out) = snapshot {
                snapshot_to(&mut ctx, &out)?;
            }
        }
    }

    let stats = ctx.stats();
    info!(
        "{} reads / {} progs / {} erases / {} syncs, {} failures",
        stats.reads, stats.progs, stats.erases, stats.syncs, stats.failures
    );
    Ok(())
}

fn info_cmd(ctx: &BlockContext) {
    let g = ctx.geometry();
    println!("backend     : {}", ctx.backend_kind());
    println!("block size  : {}", g.block_size);
    println!("block count : {}", g.block_count);
    println!("geometry    : {} bytes", g.total_bytes());
    match ctx.capacity() {
        // open_backend already refused media smaller than the geometry.
        Some(bytes) => println!("capacity    : {} bytes ({})", bytes, "fits".green()),
        None => println!("capacity    : {}", "unknown".yellow()),
    }
}

fn erase_all(ctx: &mut BlockContext) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping after current block...");
        r.store(false, Ordering::SeqCst);
    })?;

    let count = ctx.geometry().block_count;
    let mut erased = 0;
    for block in 0..count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        check(ctx.erase(block), "erase")?;
        erased += 1;
    }
    check(ctx.sync(), "sync")?;

    if erased < count {
        println!("{} erased {} of {} blocks", "INTERRUPTED".yellow(), erased, count);
    } else {
        println!("erased {} blocks", erased);
    }
    Ok(())
}

fn verify(ctx: &mut BlockContext, blocks: u32) -> anyhow::Result<()> {
    let block_size = ctx.geometry().block_size;
    let mut rng = rand::thread_rng();
    let mut failed = 0u32;

    for block in 0..blocks {
        check(ctx.erase(block), "erase")?;
        let blank = ctx.read(block, 0, block_size as usize)?;
        if blank.iter().any(|&b| b != ERASED_BYTE) {
            println!("block {:>6}: {} (not erased)", block, "FAIL".red());
            failed += 1;
            continue;
        }

        let off = rng.gen_range(0..block_size);
        let mut pattern = vec![0u8; rng.gen_range(1..=(block_size - off)) as usize];
        rng.fill_bytes(&mut pattern);
        check(ctx.prog(block, off, &pattern), "prog")?;

        if ctx.read(block, off, pattern.len())? != pattern {
            println!("block {:>6}: {} (read-back mismatch at offset {})", block, "FAIL".red(), off);
            failed += 1;
        }
    }
    check(ctx.sync(), "sync")?;

    if failed > 0 {
        println!("{} {} of {} blocks", "FAIL".red().bold(), failed, blocks);
        bail!("verification failed on {} blocks", failed);
    }
    println!("{} {} blocks", "PASS".green().bold(), blocks);
    Ok(())
}

fn snapshot_to(ctx: &mut BlockContext, out: &Path) -> anyhow::Result<()> {
    let g = *ctx.geometry();
    let mut image = Vec::with_capacity(g.total_bytes() as usize);
    for block in 0..g.block_count {
        image.extend_from_slice(&ctx.read(block, 0, g.block_size as usize)?);
    }
    std::fs::write(out, &image).with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {} bytes to {}", image.len(), out.display());
    Ok(())
}
