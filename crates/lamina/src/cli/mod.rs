//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};

use crate::config::LayerConfig;
use crate::layer::TemplateCheck;
use crate::manager::LayerManager;
use crate::mount::UnmountOperation;

/// Lamina - container layer stack management
#[derive(Parser)]
#[command(name = "lamina")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for lamina state
    #[arg(
        long,
        global = true,
        env = "LAMINA_ROOT",
        default_value = "/var/lib/lamina"
    )]
    pub root: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Fail instead of warning when the base layer lacks template disks
    #[arg(long, global = true)]
    pub enforce_base_templates: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Layer commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a scratch layer over a chain of parent layers
    Create {
        /// Path of the new layer
        path: PathBuf,

        /// Parent layer, nearest first and base last (repeatable)
        #[arg(short, long = "layer")]
        layers: Vec<PathBuf>,
    },

    /// Create the template virtual disks of a base layer
    Makebaselayer {
        /// Path of the base layer
        path: PathBuf,
    },

    /// Mount a scratch layer over its parents and print the mount path
    Mount {
        /// Path of the scratch layer
        path: PathBuf,

        /// Parent layer, nearest first and base last (repeatable)
        #[arg(short, long = "layer")]
        layers: Vec<PathBuf>,
    },

    /// Unmount a scratch layer
    Unmount {
        /// Path of the scratch layer
        path: PathBuf,

        /// Detach the storage filter but leave the virtual disk attached
        #[arg(long, conflicts_with = "disk_only")]
        keep_disk: bool,

        /// Detach only the virtual disk, after an earlier `--keep-disk`
        #[arg(long)]
        disk_only: bool,
    },

    /// Remove a layer and everything in it
    Remove {
        /// Path of the layer
        path: PathBuf,
    },
}

impl Cli {
    /// Layer configuration selected by the global flags.
    #[must_use]
    pub fn config(&self) -> LayerConfig {
        let template_check = if self.enforce_base_templates {
            TemplateCheck::Enforce
        } else {
            TemplateCheck::Warn
        };
        LayerConfig::default()
            .with_root(self.root.clone())
            .with_template_check(template_check)
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.config();
        config.paths.create_dirs().wrap_err_with(|| {
            format!("Failed to create state directory {}", config.paths.root.display())
        })?;
        let manager = LayerManager::local(&config);

        match self.command {
            Commands::Create { path, layers } => {
                let scratch = manager
                    .create_scratch(&path, &layers)
                    .await
                    .wrap_err("Failed to create scratch layer")?;
                tracing::debug!(sandbox = %scratch.sandbox().display(), "Sandbox disk ready");
                Ok(())
            }

            Commands::Makebaselayer { path } => {
                manager
                    .make_base_layer(&path)
                    .await
                    .wrap_err("Failed to make base layer")?;
                Ok(())
            }

            Commands::Mount { path, layers } => {
                let handle = manager
                    .mount(&path, &layers)
                    .await
                    .wrap_err("Failed to mount layer")?;
                println!("{}", handle.mount_path());
                Ok(())
            }

            Commands::Unmount {
                path,
                keep_disk,
                disk_only,
            } => {
                let operation = match (keep_disk, disk_only) {
                    (true, _) => UnmountOperation::Filter,
                    (_, true) => UnmountOperation::Disk,
                    _ => UnmountOperation::All,
                };
                manager
                    .unmount(&path, operation)
                    .await
                    .wrap_err("Failed to unmount layer")?;
                Ok(())
            }

            Commands::Remove { path } => {
                manager
                    .remove(&path)
                    .await
                    .wrap_err("Failed to remove layer")?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn layers_keep_order() {
        let cli = Cli::try_parse_from([
            "lamina", "mount", "/l/scratch", "-l", "/l/mid", "--layer", "/l/base",
        ])
        .unwrap();

        match cli.command {
            Commands::Mount { layers, .. } => {
                assert_eq!(layers, [PathBuf::from("/l/mid"), PathBuf::from("/l/base")]);
            }
            _ => panic!("expected mount"),
        }
    }

    #[test]
    fn enforce_flag_selects_policy() {
        let cli = Cli::try_parse_from([
            "lamina",
            "--root",
            "/tmp/state",
            "--enforce-base-templates",
            "makebaselayer",
            "/l/base",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.template_check, TemplateCheck::Enforce);
        assert_eq!(config.paths.root, PathBuf::from("/tmp/state"));
    }

    #[test]
    fn unmount_flags_conflict() {
        let cli = Cli::try_parse_from(["lamina", "unmount", "/l/scratch", "--disk-only"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Unmount {
                keep_disk: false,
                disk_only: true,
                ..
            }
        ));

        assert!(
            Cli::try_parse_from(["lamina", "unmount", "/l/scratch", "--keep-disk", "--disk-only"])
                .is_err()
        );
    }
}
