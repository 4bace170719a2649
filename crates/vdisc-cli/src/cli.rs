use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vdisc_iso9660::NamePolicy;

#[derive(Parser)]
#[command(name = "vdisc", about = "Virtual disc images backed by remote objects", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter when RUST_LOG is unset, e.g. `debug` or `vdisc_cache=trace`
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Cache configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Cache blocks on disk under this directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Read extents without caching
    #[arg(long, global = true, conflicts_with = "cache_dir")]
    pub no_cache: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a virtual disc from a CSV burn list
    Burn(BurnArgs),
    /// Print the primary volume descriptor as JSON
    Inspect(InspectArgs),
    /// Print every path in the image
    Tree(TreeArgs),
    /// List a directory
    Ls(LsArgs),
    /// Copy a file out of the image
    Cp(CpArgs),
    /// Maintain a disk cache
    Cache(CacheArgs),
    /// Print the version
    Version,
}

#[derive(Args)]
pub struct BurnArgs {
    /// CSV of `path,url[,size]` rows (`symlink:TARGET` urls make links), or `-` for stdin
    pub list: String,
    /// Where to publish the catalog
    pub url: String,
    #[arg(long, default_value = "extended")]
    pub name_policy: NamePolicy,
    #[arg(long)]
    pub volume_id: Option<String>,
    #[arg(long)]
    pub publisher: Option<String>,
    /// Print the burn report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    pub url: String,
    /// List the catalog's extents instead
    #[arg(long)]
    pub extents: bool,
}

#[derive(Args)]
pub struct TreeArgs {
    pub url: String,
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Args)]
pub struct LsArgs {
    pub url: String,
    #[arg(default_value = "/")]
    pub path: String,
    /// Long listing with mode, owner, size and time
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args)]
pub struct CpArgs {
    pub url: String,
    /// Path inside the image
    pub src: String,
    /// Local path or storage URL
    pub dst: String,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Verify the checksum of every entry
    Fsck {
        dir: PathBuf,
    },
    /// Evict entries until enough space is free
    Gc {
        dir: PathBuf,
        /// Free space to reach: a percentage (`15%`) or a size (`10G`)
        #[arg(long, default_value = "15%")]
        threshold: String,
    },
}
