use clap::{Args, Subcommand};
use std::path::PathBuf;

use barralibre_core::catalog::previous_session;
use barralibre_core::models::DEFAULT_PHASE;
use barralibre_core::{FileKvStore, Session};

use super::{confirm, load_catalog, OutputFormat};
use crate::config::Config;

#[derive(Args)]
pub struct ProgramCommand {
    #[command(subcommand)]
    pub command: ProgramSubcommand,
}

#[derive(Subcommand)]
pub enum ProgramSubcommand {
    /// List available programs
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the phases and sessions of a program
    Show {
        /// Program ID (defaults to the active program)
        id: Option<String>,
    },

    /// Switch the active program
    Use {
        /// Program ID
        id: String,
    },

    /// Import a custom program from a JSON file
    Import {
        /// Path to the program file
        file: PathBuf,
    },

    /// Remove a custom program
    Remove {
        /// Program ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Show the next session to train
    Next,
}

impl ProgramCommand {
    pub fn run(
        &self,
        session: &mut Session<FileKvStore>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = load_catalog(config, session)?;

        match &self.command {
            ProgramSubcommand::List { format } => {
                let programs = catalog.list();
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&programs)?);
                    }
                    OutputFormat::Text => {
                        if programs.is_empty() {
                            println!("No programs found in {}", config.programs_dir.value.display());
                            return Ok(());
                        }
                        let active = &session.graph().program;
                        for p in &programs {
                            let marker = if &p.id == active { "*" } else { " " };
                            let kind = if p.builtin { "" } else { " (custom)" };
                            println!("{} {:30} {}{}", marker, p.id, p.name, kind);
                            if !p.desc.is_empty() {
                                println!("  {:30} {}", "", p.desc);
                            }
                        }
                    }
                }
                Ok(())
            }

            ProgramSubcommand::Show { id } => {
                let id = id.clone().unwrap_or_else(|| session.graph().program.clone());
                let program = catalog
                    .get(&id)
                    .ok_or_else(|| format!("Program not found: {}", id))?;

                let name = if program.meta.name.is_empty() {
                    &id
                } else {
                    &program.meta.name
                };
                println!("{}", name);
                println!("{}", "=".repeat(name.len()));
                if !program.meta.desc.is_empty() {
                    println!("{}", program.meta.desc);
                }
                for phase in catalog.phases(&id) {
                    println!("\n{}. {}", phase.number, phase.name);
                    for name in catalog.sessions(&id, phase.number) {
                        let count = catalog
                            .session_template(&id, phase.number, name)
                            .map_or(0, <[_]>::len);
                        println!("  - {} ({} exercises)", name, count);
                    }
                }
                Ok(())
            }

            ProgramSubcommand::Use { id } => {
                if !catalog.contains(id) {
                    return Err(format!("Program not found: {}", id).into());
                }
                session.set_program(id.clone())?;

                let phase = session.graph().phase;
                if !catalog.phases(id).iter().any(|p| p.number == phase) {
                    session.set_phase(DEFAULT_PHASE)?;
                }
                println!(
                    "Active program: {} (phase {})",
                    id,
                    session.graph().phase
                );
                Ok(())
            }

            ProgramSubcommand::Import { file } => {
                let contents = std::fs::read_to_string(file)
                    .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
                let value: serde_json::Value = serde_json::from_str(&contents)
                    .map_err(|e| format!("Invalid JSON in '{}': {}", file.display(), e))?;

                let id = session.import_program(value)?;
                println!("Imported program: {}", id);
                println!("Run 'barra program use {}' to start it.", id);
                Ok(())
            }

            ProgramSubcommand::Remove { id, force } => {
                if catalog.is_builtin(id) && session.graph().custom_program(id).is_none() {
                    return Err(format!("'{}' is a built-in program and cannot be removed", id).into());
                }
                if !force && !confirm(&format!("Remove program '{}'?", id))? {
                    println!("Removal cancelled.");
                    return Ok(());
                }
                session.remove_program(id)?;
                println!("Removed program: {}", id);
                Ok(())
            }

            ProgramSubcommand::Next => {
                let graph = session.graph();
                let Some(next) = catalog.next_session(graph) else {
                    println!(
                        "Program '{}' has no sessions in phase {}",
                        graph.program, graph.phase
                    );
                    return Ok(());
                };

                println!("Next: {} (phase {})", next, graph.phase);
                let last = previous_session(graph, &next);
                if let Some(template) = catalog.session_template(&graph.program, graph.phase, &next)
                {
                    for exercise in template {
                        let previous = last
                            .map(|w| w.max_kg(&exercise.name))
                            .filter(|kg| *kg > 0.0)
                            .map(|kg| format!(" (last: {}kg)", kg))
                            .unwrap_or_default();
                        let scheme = match (exercise.sets, &exercise.reps) {
                            (Some(sets), Some(reps)) => format!(" {}x{}", sets, display_reps(reps)),
                            (Some(sets), None) => format!(" {} sets", sets),
                            (None, Some(reps)) => format!(" {}", display_reps(reps)),
                            (None, None) => String::new(),
                        };
                        println!("  - {}{}{}", exercise.name, scheme, previous);
                    }
                }
                Ok(())
            }
        }
    }
}

fn display_reps(reps: &serde_json::Value) -> String {
    match reps {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
