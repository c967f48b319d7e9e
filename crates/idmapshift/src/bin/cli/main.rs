//! idmapshift: shift the ownership of a directory tree between ID ranges
//!
//! This binary exposes the idmapshift library. Given a tree extracted inside
//! a user namespace (for example a container root filesystem) and the
//! namespace's uid/gid mappings, it rewrites every owner to its host-side ID:
//!
//! ```text
//! idmapshift -u 0:100000:65536 -g 0:100000:65536 /srv/guest
//! ```
//!
//! Owners outside every range become `--nobody` (65534 by default). With
//! `--confirm` nothing is written; the exit status tells whether the tree is
//! already owned within the host side of the mappings.
//!
//! Exit status is 0 on success, 1 on a failed confirmation or any runtime
//! error, and 2 on invalid arguments.
//!
//! Logging goes to stderr and is controlled by `IDMAPSHIFT_LOG` (an
//! `EnvFilter` directive, default `warn`) or `--log-level`.

mod output;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use idmapshift::subid::read_subid_mappings;
use idmapshift::{
    IdMapList, MappingConfig, NOBODY_ID, ShiftOptions, confirm_dir, shift_dir,
};
use output::{ConfirmSummary, OutputFormat, ShiftSummary};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the default log filter.
const LOG_ENV: &str = "IDMAPSHIFT_LOG";

#[derive(Parser)]
#[command(name = "idmapshift")]
#[command(about = "User namespace filesystem owner shift", long_about = None)]
struct Cli {
    /// Root of the tree to shift or confirm
    path: PathBuf,

    /// UID maps as guest-id:host-id:count[,...]
    #[arg(short, long)]
    uid: Option<IdMapList>,

    /// GID maps as guest-id:host-id:count[,...]
    #[arg(short, long)]
    gid: Option<IdMapList>,

    /// Owner for IDs outside every map [default: 65534]
    #[arg(short, long)]
    nobody: Option<u32>,

    /// Compute new owners without changing anything
    #[arg(short, long)]
    dry_run: bool,

    /// Print every entry as `path uid:gid -> uid:gid`
    #[arg(short, long)]
    verbose: bool,

    /// Check that the tree is already shifted instead of shifting it
    #[arg(short, long, conflicts_with = "dry_run")]
    confirm: bool,

    /// TOML file with `uid`, `gid` and `nobody` settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Take maps for USER from /etc/subuid and /etc/subgid
    #[arg(long, value_name = "USER")]
    subid: Option<String>,

    /// Summary format for verbose runs
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log filter, overriding IDMAPSHIFT_LOG
    #[arg(long)]
    log_level: Option<String>,
}

/// Maps and fallback after merging all sources.
struct Mappings {
    uid: IdMapList,
    gid: IdMapList,
    nobody: u32,
}

impl Cli {
    /// Merge mappings: command line, then --subid, then --config.
    fn mappings(&self) -> Result<Mappings> {
        let config = match &self.config {
            Some(path) => MappingConfig::load(path)?,
            None => MappingConfig::default(),
        };

        let subid = match &self.subid {
            Some(user) if self.uid.is_none() || self.gid.is_none() => Some(
                read_subid_mappings(user)
                    .with_context(|| format!("reading subordinate ids for {user}"))?,
            ),
            _ => None,
        };
        let (subid_uid, subid_gid) = match subid {
            Some((uid, gid)) => (Some(IdMapList(uid)), Some(IdMapList(gid))),
            None => (None, None),
        };

        let uid = match (&self.uid, subid_uid) {
            (Some(maps), _) => maps.clone(),
            (None, Some(maps)) => maps,
            (None, None) => config.uid_maps()?,
        };
        let gid = match (&self.gid, subid_gid) {
            (Some(maps), _) => maps.clone(),
            (None, Some(maps)) => maps,
            (None, None) => config.gid_maps()?,
        };
        let nobody = self.nobody.or(config.nobody).unwrap_or(NOBODY_ID);

        Ok(Mappings { uid, gid, nobody })
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log level {directive:?}"))?,
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run_shift(cli: &Cli, maps: &Mappings) -> Result<ExitCode> {
    let options = ShiftOptions {
        nobody: maps.nobody,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = shift_dir(&cli.path, &maps.uid, &maps.gid, &options, &mut out)
        .with_context(|| format!("shifting {}", cli.path.display()))?;
    out.flush()?;
    drop(out);

    if cli.verbose {
        let summary = ShiftSummary {
            root: cli.path.display().to_string(),
            dry_run: cli.dry_run,
            stats: &stats,
        };
        output::print_shift_summary(&summary, cli.format)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn run_confirm(cli: &Cli, maps: &Mappings) -> Result<ExitCode> {
    let confirmation = confirm_dir(&cli.path, &maps.uid, &maps.gid, maps.nobody)
        .with_context(|| format!("confirming {}", cli.path.display()))?;

    if cli.verbose {
        let summary = ConfirmSummary {
            root: cli.path.display().to_string(),
            confirmation: &confirmation,
        };
        output::print_confirm_summary(&summary, cli.format)?;
    }

    Ok(if confirmation.is_confirmed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    // All mapping sources are validated before the tree is touched.
    let maps = cli.mappings()?;
    tracing::debug!(
        uid = %maps.uid,
        gid = %maps.gid,
        nobody = maps.nobody,
        "resolved mappings"
    );

    if cli.confirm {
        run_confirm(&cli, &maps)
    } else {
        run_shift(&cli, &maps)
    }
}
