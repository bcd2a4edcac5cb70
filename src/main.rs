use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use barralibre_core::{FileKvStore, RecordStore, Session};

mod commands;
mod config;
mod sync;

use commands::{
    AuthCommand, BodyCommand, BodySubcommand, ConfigCommand, DataCommand, DataSubcommand,
    PhaseCommand, ProgramCommand, ProgramSubcommand, SettingsCommand, SyncCommand,
    SyncSubcommand, WorkoutCommand, WorkoutSubcommand,
};
use config::Config;
use sync::AutoSync;

#[derive(Parser)]
#[command(name = "barra")]
#[command(version)]
#[command(about = "Barra Libre workout tracker", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log and review workouts
    Workout(WorkoutCommand),

    /// Log body measurements
    Body(BodyCommand),

    /// Show or change the active phase
    Phase(PhaseCommand),

    /// Manage training programs
    Program(ProgramCommand),

    /// Show or change personal settings
    Settings(SettingsCommand),

    /// Export, import or wipe data
    Data(DataCommand),

    /// Back up and restore
    Sync(SyncCommand),

    /// Sign in to Google Drive
    Auth(AuthCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barra=warn,barralibre_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    let store = RecordStore::new(FileKvStore::new(config.data_dir.value.clone()));
    let mut session = Session::open(store);

    let auto_sync = AutoSync::from_config(&config);
    if let Some(auto_sync) = &auto_sync {
        auto_sync.attach(&mut session);
    }

    // Auto-sync BEFORE commands that read or change the data
    if pulls_first(&cli.command) {
        if let Some(auto_sync) = &auto_sync {
            auto_sync.pull(&mut session);
        }
    }

    // Execute the command
    let result = execute_command(&cli.command, &mut session, &config, cli_config_path);

    // Flush the backup scheduled by write commands before exiting
    if result.is_ok() && is_write_command(&cli.command) {
        if let Some(auto_sync) = &auto_sync {
            auto_sync.flush(&mut session);
        }
    }

    result
}

fn execute_command(
    command: &Option<Commands>,
    session: &mut Session<FileKvStore>,
    config: &Config,
    cli_config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Some(Commands::Workout(cmd)) => {
            cmd.run(session, config)?;
        }
        Some(Commands::Body(cmd)) => {
            cmd.run(session, config)?;
        }
        Some(Commands::Phase(cmd)) => {
            cmd.run(session, config)?;
        }
        Some(Commands::Program(cmd)) => {
            cmd.run(session, config)?;
        }
        Some(Commands::Settings(cmd)) => {
            cmd.run(session)?;
        }
        Some(Commands::Data(cmd)) => {
            cmd.run(session)?;
        }
        Some(Commands::Sync(cmd)) => {
            cmd.run(session, config)?;
        }
        Some(Commands::Auth(cmd)) => {
            cmd.run(config)?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Returns true if the command is a read operation that should sync before execution.
fn is_read_command(cmd: &Option<Commands>) -> bool {
    matches!(
        cmd,
        Some(Commands::Workout(w)) if matches!(w.command,
            WorkoutSubcommand::List { .. }
            | WorkoutSubcommand::Show { .. }
            | WorkoutSubcommand::Last { .. })
    ) || matches!(
        cmd,
        Some(Commands::Body(b)) if matches!(b.command, BodySubcommand::List { .. })
    ) || matches!(
        cmd,
        Some(Commands::Program(p)) if matches!(p.command,
            ProgramSubcommand::List { .. }
            | ProgramSubcommand::Show { .. }
            | ProgramSubcommand::Next)
    ) || matches!(cmd, Some(Commands::Phase(p)) if p.phase.is_none())
        || matches!(cmd, Some(Commands::Settings(s)) if !s.is_update())
        || matches!(
            cmd,
            Some(Commands::Data(d)) if matches!(d.command, DataSubcommand::Export { .. })
        )
}

/// Returns true if the backup should be merged in before the command runs.
///
/// Sync commands fetch the backup themselves.
fn pulls_first(cmd: &Option<Commands>) -> bool {
    if matches!(cmd, Some(Commands::Sync(_))) {
        return false;
    }
    is_read_command(cmd) || is_write_command(cmd)
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(cmd: &Option<Commands>) -> bool {
    matches!(
        cmd,
        Some(Commands::Workout(w)) if matches!(w.command,
            WorkoutSubcommand::Log { .. }
            | WorkoutSubcommand::Edit { .. }
            | WorkoutSubcommand::Delete { .. })
    ) || matches!(
        cmd,
        Some(Commands::Body(b)) if matches!(b.command,
            BodySubcommand::Log { .. } | BodySubcommand::Delete { .. })
    ) || matches!(
        cmd,
        Some(Commands::Program(p)) if matches!(p.command,
            ProgramSubcommand::Use { .. }
            | ProgramSubcommand::Import { .. }
            | ProgramSubcommand::Remove { .. })
    ) || matches!(cmd, Some(Commands::Phase(p)) if p.phase.is_some())
        || matches!(cmd, Some(Commands::Settings(s)) if s.is_update())
        || matches!(
            cmd,
            Some(Commands::Data(d)) if matches!(d.command,
                DataSubcommand::Import { .. } | DataSubcommand::Wipe { .. })
        )
        || matches!(
            cmd,
            Some(Commands::Sync(s)) if matches!(s.command,
                SyncSubcommand::Restore { .. } | SyncSubcommand::Pull)
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Commands> {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_read_commands() {
        assert!(is_read_command(&parse(&["barra", "workout", "list"])));
        assert!(is_read_command(&parse(&["barra", "program", "next"])));
        assert!(is_read_command(&parse(&["barra", "phase"])));
        assert!(!is_read_command(&parse(&["barra", "phase", "2"])));
        assert!(!is_read_command(&parse(&["barra", "sync", "backup"])));
    }

    #[test]
    fn test_write_commands() {
        assert!(is_write_command(&parse(&[
            "barra", "workout", "log", "--session", "A", "-e", "Sentadilla:60x5"
        ])));
        assert!(is_write_command(&parse(&["barra", "phase", "2"])));
        assert!(is_write_command(&parse(&["barra", "settings", "--age", "40"])));
        assert!(is_write_command(&parse(&["barra", "sync", "pull"])));
        assert!(!is_write_command(&parse(&["barra", "settings"])));
        assert!(!is_write_command(&parse(&["barra", "workout", "list"])));
    }

    #[test]
    fn test_pulls_before_reads_and_writes() {
        assert!(pulls_first(&parse(&["barra", "workout", "list"])));
        assert!(pulls_first(&parse(&[
            "barra", "workout", "log", "-e", "Sentadilla:60x5"
        ])));
        assert!(pulls_first(&parse(&["barra", "body", "log", "-m", "peso=70"])));
        assert!(!pulls_first(&parse(&["barra", "sync", "pull"])));
        assert!(!pulls_first(&parse(&["barra", "config", "show"])));
    }

    #[test]
    fn test_body_log_requires_measure() {
        assert!(Cli::try_parse_from(["barra", "body", "log"]).is_err());
        assert!(Cli::try_parse_from(["barra", "body", "log", "-m", "peso=70"]).is_ok());
    }
}
