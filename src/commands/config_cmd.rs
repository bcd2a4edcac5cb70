use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

const DEFAULT_CONFIG: &str = r#"# Barra Libre configuration

# Where the local document and sign-in tokens live
# (default: platform data directory, e.g. ~/.local/share/barralibre)
# data_dir: ~/.local/share/barralibre

# Directory containing programs.json and the built-in programs
# (default: <data_dir>/programs)
# programs_dir: ./programs

sync:
  # Back up after every change and pull before reading
  auto_sync: false

  # Folder backend: a directory kept in sync by another tool
  # folder: ~/Dropbox/barra-libre

  # Google Drive backend (run 'barra auth login' afterwards)
  # backend: drive
  # client_id: "<OAuth client id>"

  # Seconds of inactivity before an automatic backup
  # debounce_secs: 3

  # Which side wins program, phase and settings on merge: remote or local
  # scalar_policy: remote
"#;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("programs_dir: {}", config.programs_dir.value.display());
                        println!("  source: {}", config.programs_dir.source);
                        println!();

                        let sync = &config.sync;
                        println!("sync:");
                        println!("  auto_sync: {}", sync.auto_sync);
                        match sync.effective_backend() {
                            Some(backend) => println!("  backend: {}", backend),
                            None => println!("  backend: (none)"),
                        }
                        if let Some(folder) = &sync.folder {
                            println!("  folder: {}", folder.display());
                        }
                        if let Some(client_id) = &sync.client_id {
                            println!("  client_id: {}", client_id);
                        }
                        println!("  debounce_secs: {}", sync.debounce_secs);
                        println!("  scalar_policy: {}", sync.scalar_policy);
                        println!("  keep_revisions: {}", sync.keep_revisions);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                // Check if config already exists
                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'barra config show' to view current configuration.");
                    return Ok(());
                }

                // Create parent directory
                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
