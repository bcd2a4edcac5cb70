use clap::Args;

use barralibre_core::{FileKvStore, Session};

use super::load_catalog;
use crate::config::Config;

/// Show or change the active phase
#[derive(Args)]
pub struct PhaseCommand {
    /// Phase number to switch to
    pub phase: Option<u32>,
}

impl PhaseCommand {
    pub fn run(
        &self,
        session: &mut Session<FileKvStore>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let catalog = load_catalog(config, session)?;
        let program = session.graph().program.clone();
        let phases = catalog.phases(&program);

        if let Some(phase) = self.phase {
            if !phases.is_empty() && !phases.iter().any(|p| p.number == phase) {
                return Err(format!("Program '{}' has no phase {}", program, phase).into());
            }
            session.set_phase(phase)?;
            println!("Active phase: {}", phase);
            return Ok(());
        }

        let current = session.graph().phase;
        if phases.is_empty() {
            println!("Active phase: {}", current);
            return Ok(());
        }
        for p in &phases {
            let marker = if p.number == current { "*" } else { " " };
            if p.desc.is_empty() {
                println!("{} {} {}", marker, p.number, p.name);
            } else {
                println!("{} {} {} - {}", marker, p.number, p.name, p.desc);
            }
        }
        Ok(())
    }
}
