use chrono::Local;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use barralibre_core::{export_file_name, export_json, FileKvStore, Session};

use super::confirm;

#[derive(Args)]
pub struct DataCommand {
    #[command(subcommand)]
    pub command: DataSubcommand,
}

#[derive(Subcommand)]
pub enum DataSubcommand {
    /// Export all data to a JSON file
    Export {
        /// Output path ("-" for stdout), defaults to barra-libre-<date>.json
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Merge an exported JSON file into the current data
    Import {
        /// Path to the exported file
        file: PathBuf,
    },

    /// Delete all local data
    Wipe {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl DataCommand {
    pub fn run(&self, session: &mut Session<FileKvStore>) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DataSubcommand::Export { output } => {
                let json = export_json(session.graph())?;
                let path = output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(export_file_name(Local::now().date_naive())));

                if path.as_os_str() == "-" {
                    println!("{}", json);
                    return Ok(());
                }
                std::fs::write(&path, json)
                    .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
                let graph = session.graph();
                println!(
                    "Exported {} workouts and {} body logs to {}",
                    graph.workouts.len(),
                    graph.body_logs.len(),
                    path.display()
                );
                Ok(())
            }

            DataSubcommand::Import { file } => {
                let contents = std::fs::read_to_string(file)
                    .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
                let summary = session.import_document(&contents)?;
                println!(
                    "Imported {}: workouts {} -> {}, body logs {} -> {}",
                    file.display(),
                    summary.workouts_before,
                    summary.workouts_after,
                    summary.body_logs_before,
                    summary.body_logs_after
                );
                Ok(())
            }

            DataSubcommand::Wipe { force } => {
                if !force
                    && !confirm("Delete all local data?")?
                {
                    println!("Wipe cancelled.");
                    return Ok(());
                }
                session.wipe()?;
                println!("All local data deleted.");
                Ok(())
            }
        }
    }
}
