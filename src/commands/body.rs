use chrono::Local;
use clap::{Args, Subcommand};

use barralibre_core::models::is_measure_name;
use barralibre_core::{BodyLog, FileKvStore, RecordId, Session};

use super::{confirm, load_catalog, parse_date, OutputFormat};
use crate::config::Config;

#[derive(Args)]
pub struct BodyCommand {
    #[command(subcommand)]
    pub command: BodySubcommand,
}

#[derive(Subcommand)]
pub enum BodySubcommand {
    /// Log body measurements
    Log {
        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Measurement as key=value, e.g. peso=72.5 (can be repeated)
        #[arg(long = "measure", short = 'm', value_name = "KEY=VALUE", required = true)]
        measures: Vec<String>,
    },

    /// List body logs, most recent first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the known measurements
    Measures,

    /// Delete a body log
    Delete {
        /// Body log ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl BodyCommand {
    pub fn run(
        &self,
        session: &mut Session<FileKvStore>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            BodySubcommand::Log { date, measures } => {
                let date = match date {
                    Some(d) => parse_date(d)?,
                    None => Local::now().date_naive(),
                };

                let known = load_catalog(config, session)?;
                let mut log = BodyLog::new(session.next_id(), date);
                for measure in measures {
                    let (name, value) = parse_measure(measure)?;
                    if !known.body_measures().is_empty()
                        && !known.body_measures().iter().any(|m| m.id == name)
                    {
                        tracing::warn!("Unknown measurement '{}'", name);
                    }
                    log.set_measure(name, value);
                }

                session.add_body_log(log.clone())?;
                println!("Logged: {}", log);
                Ok(())
            }

            BodySubcommand::List { format } => {
                let mut logs = session.graph().body_logs_by_date();
                logs.reverse();

                if logs.is_empty() {
                    println!("No body logs found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&logs)?);
                    }
                    OutputFormat::Text => {
                        for log in &logs {
                            println!("{}", log);
                        }
                        println!("\nTotal: {} body log(s)", logs.len());
                    }
                }
                Ok(())
            }

            BodySubcommand::Measures => {
                let catalog = load_catalog(config, session)?;
                if catalog.body_measures().is_empty() {
                    println!("No measurements defined");
                    return Ok(());
                }
                for m in catalog.body_measures() {
                    println!("  {:12} {}", m.id, m.label);
                }
                Ok(())
            }

            BodySubcommand::Delete { id, force } => {
                let id: RecordId = id.parse()?;
                let log = session
                    .graph()
                    .body_log(id)
                    .ok_or_else(|| format!("Body log not found: {}", id))?;

                if !force && !confirm(&format!("Delete body log from {}?", log.date_label()))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = session.delete_body_log(id)?;
                println!("Deleted body log from {}", deleted.date_label());
                Ok(())
            }
        }
    }
}

fn parse_measure(value: &str) -> Result<(String, f64), String> {
    let (name, number) = value
        .split_once('=')
        .ok_or_else(|| format!("Invalid measurement '{}'. Use key=value.", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Measurement name missing in '{}'", value));
    }
    if !is_measure_name(name) {
        return Err(format!("'{}' is reserved and cannot be a measurement", name));
    }
    let number: f64 = number
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| format!("Invalid number for '{}': {}", name, number.trim()))?;
    if !number.is_finite() {
        return Err(format!("Invalid number for '{}': {}", name, number));
    }
    Ok((name.to_string(), number))
}
