// SPDX-License-Identifier: GPL-3.0-only

//! CLI around the storage-btrfs library for inspection and manual operations

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use disks_btrfs::{
    BtrfsCli, BtrfsFilesystem, FilesystemCriteria, FilesystemRegistry, ToolsConfig, ops,
};
use serde_json::json;
use std::path::PathBuf;

/// Resolve BTRFS subvolumes to usable VFS paths
#[derive(Parser)]
#[command(name = "storage-btrfs-cli")]
#[command(about = "CLI tool for BTRFS subvolume topology", long_about = None)]
struct Cli {
    /// TOML file with tool locations (defaults to $STORAGE_BTRFS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path of the btrfs binary
    #[arg(long, global = true)]
    btrfs: Option<PathBuf>,

    /// Path of the findmnt binary
    #[arg(long, global = true)]
    findmnt: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Selects exactly one filesystem
#[derive(Args)]
struct Selection {
    /// Filesystem UUID
    #[arg(long)]
    uuid: Option<String>,
    /// Filesystem label
    #[arg(long)]
    label: Option<String>,
    /// Any device of the filesystem
    #[arg(long)]
    device: Option<PathBuf>,
}

impl From<Selection> for FilesystemCriteria {
    fn from(selection: Selection) -> Self {
        FilesystemCriteria {
            uuid: selection.uuid,
            label: selection.label,
            device: selection.device,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize all BTRFS filesystems
    List,
    /// Summarize one filesystem
    Show {
        #[command(flatten)]
        selection: Selection,
    },
    /// Print a VFS path reaching an internal path through a mounted ancestor
    Resolve {
        #[command(flatten)]
        selection: Selection,
        /// Internal subvolume path
        path: String,
    },
    /// Print the subvolume at, or closest above, an internal path
    Nearest {
        #[command(flatten)]
        selection: Selection,
        /// Internal subvolume path
        path: String,
    },
    /// Print the subvolume containing a VFS path
    Lookup {
        #[command(flatten)]
        selection: Selection,
        /// Path in the mounted filesystem
        path: PathBuf,
    },
    /// Create a new subvolume
    Create {
        #[command(flatten)]
        selection: Selection,
        /// Internal path of the subvolume to create
        path: String,
    },
    /// Delete a subvolume
    Delete {
        #[command(flatten)]
        selection: Selection,
        /// Internal path of the subvolume to delete
        path: String,
    },
    /// Create a snapshot of a subvolume
    Snapshot {
        #[command(flatten)]
        selection: Selection,
        /// Internal path of the source subvolume
        source: String,
        /// Internal path of the snapshot
        dest: String,
    },
    /// Set a subvolume as the default
    SetDefault {
        #[command(flatten)]
        selection: Selection,
        /// Internal path of the subvolume
        #[arg(required_unless_present = "id", conflicts_with = "id")]
        path: Option<String>,
        /// Subvolume id instead of a path
        #[arg(long)]
        id: Option<u64>,
    },
}

fn main() -> Result<()> {
    // Initialize tracing to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ToolsConfig::load(path)?,
        None => ToolsConfig::from_env()?,
    };
    if cli.btrfs.is_some() {
        config.btrfs = cli.btrfs.clone();
    }
    if cli.findmnt.is_some() {
        config.findmnt = cli.findmnt.clone();
    }

    let gateway = BtrfsCli::from_config(&config).context("failed to locate btrfs tools")?;
    let mut registry = FilesystemRegistry::new();

    match cli.command {
        Commands::List => {
            let summaries: Vec<_> = registry
                .filesystems(&gateway)?
                .into_iter()
                .map(BtrfsFilesystem::summary)
                .collect();
            println!("{}", serde_json::to_string(&summaries)?);
        }
        Commands::Show { selection } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            println!("{}", serde_json::to_string(&filesystem.summary())?);
        }
        Commands::Resolve { selection, path } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            println!("{}", filesystem.mount_path_as_child(&path)?.display());
        }
        Commands::Nearest { selection, path } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let nearest = filesystem.nearest_subvolume(&path);
            println!("{}", json!({ "id": nearest.id(), "path": nearest.path() }));
        }
        Commands::Lookup { selection, path } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let subvolume = filesystem.subvolume_for_vfs_path(&path).with_context(|| {
                format!("{} is not inside a mount of this filesystem", path.display())
            })?;
            println!("{}", json!({ "id": subvolume.id(), "path": subvolume.path() }));
        }
        Commands::Create { selection, path } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let target = ops::create_subvolume(filesystem, &gateway, &path)?;
            println!("{}", json!({ "success": true, "path": target }));
        }
        Commands::Delete { selection, path } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let target = ops::delete_subvolume(filesystem, &gateway, &path)?;
            println!("{}", json!({ "success": true, "path": target }));
        }
        Commands::Snapshot {
            selection,
            source,
            dest,
        } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let (source, dest) = ops::snapshot_subvolume(filesystem, &gateway, &source, &dest)?;
            println!("{}", json!({ "success": true, "source": source, "dest": dest }));
        }
        Commands::SetDefault {
            selection,
            path,
            id,
        } => {
            let filesystem = registry.find_by_criteria(&gateway, &selection.into())?;
            let id = match (path, id) {
                (_, Some(id)) => ops::set_default_subvolume_id(filesystem, &gateway, id)?,
                (Some(path), None) => ops::set_default_subvolume(filesystem, &gateway, &path)?,
                (None, None) => anyhow::bail!("set-default needs a path or --id"),
            };
            println!("{}", json!({ "success": true, "id": id }));
        }
    }

    Ok(())
}
