use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use colored::Colorize;
use tracing::debug;
use vdisc_cache::{Cache, CacheBackend, CacheConfig, DiskCache, GcThreshold};
use vdisc_catalog::{burn, read_csv, BurnOptions, VDisc};
use vdisc_iso9660::{FileInfo, LOGICAL_BLOCK_SIZE};
use vdisc_storage::{Context, ObjectReader};

use crate::cli::*;

/// Block size assumed when a cache directory is given without a config.
const DEFAULT_DISK_BSIZE: u64 = 1024 * 1024;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        config,
        cache_dir,
        no_cache,
        ..
    } = cli;
    let ctx = Context::background();
    let cache = || -> anyhow::Result<Cache> {
        let config = cache_config(config.as_deref(), cache_dir.clone(), no_cache)?;
        Ok(Cache::from_config(&config)?)
    };
    match command {
        Command::Burn(args) => cmd_burn(&ctx, args),
        Command::Inspect(args) => cmd_inspect(&open_disc(&ctx, &args.url, &cache()?)?, args.extents),
        Command::Tree(args) => cmd_tree(&open_disc(&ctx, &args.url, &cache()?)?, &args.path),
        Command::Ls(args) => cmd_ls(&open_disc(&ctx, &args.url, &cache()?)?, &args.path, args.long),
        Command::Cp(args) => cmd_cp(&ctx, &open_disc(&ctx, &args.url, &cache()?)?, &args.src, &args.dst),
        Command::Cache(args) => cmd_cache(args.action),
        Command::Version => {
            println!("vdisc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Cache settings from the config file, overridden by flags.
pub fn cache_config(path: Option<&Path>, cache_dir: Option<PathBuf>, no_cache: bool) -> anyhow::Result<CacheConfig> {
    let mut config = match path {
        Some(p) => CacheConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => CacheConfig::default(),
    };
    if let Some(root) = cache_dir {
        let bsize = match config.backend {
            CacheBackend::Memory { bsize, .. } | CacheBackend::Disk { bsize, .. } => bsize,
            CacheBackend::None => DEFAULT_DISK_BSIZE,
        };
        config.backend = CacheBackend::Disk { root, bsize };
    }
    if no_cache {
        config.backend = CacheBackend::None;
    }
    debug!(backend = ?config.backend, "cache configuration");
    Ok(config)
}

fn open_disc(ctx: &Context, url: &str, cache: &Cache) -> anyhow::Result<VDisc> {
    VDisc::open_with(ctx, vdisc_storage::global(), url, cache).with_context(|| format!("opening {url}"))
}

fn cmd_burn(ctx: &Context, args: BurnArgs) -> anyhow::Result<()> {
    let input: Box<dyn Read> = if args.list == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&args.list).with_context(|| format!("opening {}", args.list))?,
        ))
    };
    let entries = read_csv(input)?;

    let defaults = BurnOptions::default();
    let opts = BurnOptions {
        name_policy: args.name_policy,
        volume_id: args.volume_id.unwrap_or(defaults.volume_id.clone()),
        publisher_id: args.publisher.unwrap_or_default(),
        ..defaults
    };
    let report = burn(ctx, vdisc_storage::global(), &args.url, &entries, &opts)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} Burned {} files to {}", "✓".green().bold(), report.files, report.url.bold());
        println!("  Metadata: {} ({} bytes)", report.header_url.cyan(), report.metadata_size);
        println!("  Image:    {} bytes in {} extents", report.image_size, report.extents);
    }
    Ok(())
}

fn cmd_inspect(disc: &VDisc, extents: bool) -> anyhow::Result<()> {
    if !extents {
        let walker = disc.walker()?;
        println!("{}", serde_json::to_string_pretty(walker.primary_volume_descriptor())?);
        return Ok(());
    }
    let mut lba: u64 = 0;
    for (i, ext) in disc.catalog().v1().extents.iter().enumerate() {
        let url = disc.extent_url(i).unwrap_or_default();
        println!(
            "{:>10}  {:>8}  {:>4}  {}",
            lba.to_string().yellow(),
            ext.blocks,
            ext.padding,
            url
        );
        lba += ext.blocks as u64;
    }
    println!("{} extents, {} bytes", disc.extent_count(), lba * LOGICAL_BLOCK_SIZE);
    Ok(())
}

fn cmd_tree(disc: &VDisc, root: &str) -> anyhow::Result<()> {
    let walker = disc.walker()?;
    walker.walk(root, |path, info| {
        println!("{}", styled_name(path, info));
        Ok(())
    })?;
    Ok(())
}

fn cmd_ls(disc: &VDisc, path: &str, long: bool) -> anyhow::Result<()> {
    let walker = disc.walker()?;
    let info = walker.stat(path)?;
    let entries = if info.is_dir() {
        walker.read_dir(path)?
    } else {
        vec![info]
    };
    for entry in entries.iter().filter(|e| e.name != "." && e.name != "..") {
        if long {
            println!(
                "{} {:>3} {:>5} {:>5} {:>12} {} {}",
                mode_string(entry.mode),
                entry.nlink,
                entry.uid,
                entry.gid,
                entry.size,
                entry.modified.format("%Y-%m-%d %H:%M"),
                styled_name(&entry.name, entry)
            );
        } else {
            println!("{}", styled_name(&entry.name, entry));
        }
    }
    Ok(())
}

fn cmd_cp(ctx: &Context, disc: &VDisc, src: &str, dst: &str) -> anyhow::Result<()> {
    let walker = disc.walker()?;
    let file = walker.open(src)?;
    let mut writer = vdisc_storage::global().create_context(ctx, dst)?;
    let copied = io::copy(&mut ObjectReader::new(Arc::clone(&file)), &mut writer);
    let committed = match copied {
        Ok(n) => writer.commit().map(|url| (n, url)),
        Err(e) => {
            writer.abort()?;
            return Err(e).with_context(|| format!("copying {src} to {dst}"));
        }
    };
    let (n, url) = committed?;
    println!("{} {} → {} ({} bytes)", "✓".green(), src, url.bold(), n);
    Ok(())
}

fn cmd_cache(action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Fsck { dir } => {
            let cache = DiskCache::new(&dir, DEFAULT_DISK_BSIZE)?;
            let report = cache.fsck()?;
            for issue in &report.issues {
                println!("  {} {:?} {}", "✗".red(), issue.kind, issue.path.display());
            }
            if !report.is_clean() {
                bail!("{} of {} entries failed verification", report.issues.len(), report.checked);
            }
            println!("{} {} entries verified", "✓".green().bold(), report.checked);
        }
        CacheAction::Gc { dir, threshold } => {
            let threshold: GcThreshold = threshold.parse()?;
            let cache = DiskCache::new(&dir, DEFAULT_DISK_BSIZE)?;
            let report = cache.gc(threshold)?;
            let mark = if report.threshold_met { "✓".green() } else { "!".yellow() };
            println!(
                "{} GC: {} files removed, {} bytes freed",
                mark, report.files_removed, report.bytes_freed
            );
        }
    }
    Ok(())
}

fn styled_name(name: &str, info: &FileInfo) -> String {
    if info.is_dir() {
        name.blue().bold().to_string()
    } else if let Some(target) = &info.symlink {
        format!("{} -> {}", name.cyan(), target)
    } else {
        name.to_string()
    }
}

/// `ls -l` style rendering of a POSIX mode.
pub fn mode_string(mode: u32) -> String {
    let kind = match mode & 0o170_000 {
        0o040_000 => 'd',
        0o120_000 => 'l',
        _ => '-',
    };
    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 4 != 0 { 'r' } else { '-' });
        out.push(if bits & 2 != 0 { 'w' } else { '-' });
        out.push(if bits & 1 != 0 { 'x' } else { '-' });
    }
    out
}
