mod auth;
mod body;
mod config_cmd;
mod data_cmd;
mod phase;
mod program;
mod settings;
mod sync_cmd;
mod workout;

pub use auth::AuthCommand;
pub use body::{BodyCommand, BodySubcommand};
pub use config_cmd::ConfigCommand;
pub use data_cmd::{DataCommand, DataSubcommand};
pub use phase::PhaseCommand;
pub use program::{ProgramCommand, ProgramSubcommand};
pub use settings::SettingsCommand;
pub use sync_cmd::{SyncCommand, SyncSubcommand};
pub use workout::{WorkoutCommand, WorkoutSubcommand};

use barralibre_core::{ProgramCatalog, Session};
use chrono::NaiveDate;
use clap::ValueEnum;
use std::io::{self, Write};

use crate::config::Config;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Use YYYY-MM-DD.", value))
}

/// Asks a yes/no question on stdin. Anything but `y` means no.
pub(crate) fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Built-in programs from the programs directory plus the custom ones.
pub(crate) fn load_catalog<S: barralibre_core::KeyValueStore>(
    config: &Config,
    session: &Session<S>,
) -> Result<ProgramCatalog, barralibre_core::CatalogError> {
    Ok(ProgramCatalog::load_dir(&config.programs_dir.value)?.with_custom_programs(session.graph()))
}
