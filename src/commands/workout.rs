use chrono::Local;
use clap::{Args, Subcommand};

use barralibre_core::catalog::previous_session;
use barralibre_core::models::detect_prs;
use barralibre_core::{Exercise, FileKvStore, RecordId, Session, SetEntry, Workout};

use super::{confirm, load_catalog, parse_date, OutputFormat};
use crate::config::Config;

#[derive(Args)]
pub struct WorkoutCommand {
    #[command(subcommand)]
    pub command: WorkoutSubcommand,
}

#[derive(Subcommand)]
pub enum WorkoutSubcommand {
    /// Log a workout
    Log {
        /// Session name (defaults to the next session of the active phase)
        #[arg(long, short)]
        session: Option<String>,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Notes
        #[arg(long, short)]
        notes: Option<String>,

        /// Exercise as "Name:KGxREPS,KGxREPS" (can be repeated)
        #[arg(long = "exercise", short = 'e', value_name = "EXERCISE")]
        exercises: Vec<String>,
    },

    /// List workouts, most recent first
    List {
        /// Filter by session name
        #[arg(long, short)]
        session: Option<String>,

        /// Filter by date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show workout details
    Show {
        /// Workout ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the most recent workout of a session
    Last {
        /// Session name
        session: String,
    },

    /// Edit a workout
    Edit {
        /// Workout ID
        id: String,

        /// New date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,

        /// New session name
        #[arg(long, short)]
        session: Option<String>,

        /// New notes
        #[arg(long, short)]
        notes: Option<String>,

        /// Replace the exercises (can be repeated)
        #[arg(long = "exercise", short = 'e', value_name = "EXERCISE")]
        exercises: Vec<String>,
    },

    /// Delete a workout
    Delete {
        /// Workout ID
        id: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl WorkoutCommand {
    pub fn run(
        &self,
        session: &mut Session<FileKvStore>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            WorkoutSubcommand::Log {
                session: name,
                date,
                notes,
                exercises,
            } => {
                let date = match date {
                    Some(d) => parse_date(d)?,
                    None => Local::now().date_naive(),
                };
                let name = match name {
                    Some(name) => name.clone(),
                    None => load_catalog(config, session)?
                        .next_session(session.graph())
                        .ok_or("No session given and the active phase has no sessions")?,
                };
                let exercises = exercises
                    .iter()
                    .map(|e| parse_exercise(e))
                    .collect::<Result<Vec<_>, _>>()?;

                let graph = session.graph();
                let mut workout = Workout::new(session.next_id(), date, name, graph.phase)
                    .with_program(graph.program.clone())
                    .with_exercises(exercises);
                if let Some(notes) = notes {
                    workout = workout.with_notes(notes.clone());
                }

                let added = session.add_workout(workout)?;
                println!("Logged workout:");
                println!("{}", added);
                Ok(())
            }

            WorkoutSubcommand::List {
                session: name,
                date,
                format,
            } => {
                let date = date.as_deref().map(parse_date).transpose()?;
                let mut workouts = session.graph().workouts_by_date();
                workouts.reverse();
                workouts.retain(|w| {
                    name.as_ref().map_or(true, |n| &w.session == n)
                        && date.map_or(true, |d| w.date == Some(d))
                });

                if workouts.is_empty() {
                    println!("No workouts found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&workouts)?);
                    }
                    OutputFormat::Text => {
                        for w in &workouts {
                            let prs = w.prs.as_ref().map_or(0, Vec::len);
                            let prs = if prs > 0 {
                                format!(", {} PR", prs)
                            } else {
                                String::new()
                            };
                            println!(
                                "{} {:20} phase {} ({} exercises{}) [{}]",
                                w.date_label(),
                                w.session,
                                w.phase,
                                w.exercises.len(),
                                prs,
                                w.id
                            );
                        }
                        println!("\nTotal: {} workout(s)", workouts.len());
                    }
                }
                Ok(())
            }

            WorkoutSubcommand::Show { id, format } => {
                let id: RecordId = id.parse()?;
                let workout = session
                    .graph()
                    .workout(id)
                    .ok_or_else(|| format!("Workout not found: {}", id))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(workout)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", workout);
                        println!("Volume: {} kg", workout.volume());
                    }
                }
                Ok(())
            }

            WorkoutSubcommand::Last { session: name } => {
                match previous_session(session.graph(), name) {
                    Some(workout) => println!("{}", workout),
                    None => println!("No previous '{}' workout", name),
                }
                Ok(())
            }

            WorkoutSubcommand::Edit {
                id,
                date,
                session: name,
                notes,
                exercises,
            } => {
                let has_updates = date.is_some()
                    || name.is_some()
                    || notes.is_some()
                    || !exercises.is_empty();
                if !has_updates {
                    return Err("Nothing to update. Provide at least one option.".into());
                }

                let id: RecordId = id.parse()?;
                let mut workout = session
                    .graph()
                    .workout(id)
                    .cloned()
                    .ok_or_else(|| format!("Workout not found: {}", id))?;

                if let Some(d) = date {
                    workout.date = Some(parse_date(d)?);
                }
                if let Some(n) = name {
                    workout.session = n.clone();
                }
                if let Some(n) = notes {
                    workout.notes = n.clone();
                }
                if !exercises.is_empty() {
                    workout.exercises = exercises
                        .iter()
                        .map(|e| parse_exercise(e))
                        .collect::<Result<Vec<_>, _>>()?;
                    let others = session.graph().workouts.iter().filter(|w| w.id != id);
                    let prs = detect_prs(others, &workout.exercises);
                    workout.prs = (!prs.is_empty()).then_some(prs);
                }

                session.update_workout(workout.clone())?;
                println!("Updated workout:");
                println!("{}", workout);
                Ok(())
            }

            WorkoutSubcommand::Delete { id, force } => {
                let id: RecordId = id.parse()?;
                let workout = session
                    .graph()
                    .workout(id)
                    .ok_or_else(|| format!("Workout not found: {}", id))?;

                if !force
                    && !confirm(&format!(
                        "Delete workout '{}' ({})?",
                        workout.session,
                        workout.date_label()
                    ))?
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = session.delete_workout(id)?;
                println!(
                    "Deleted workout: {} ({})",
                    deleted.session,
                    deleted.date_label()
                );
                Ok(())
            }
        }
    }
}

/// Parses `"Name:65x5,65x5"`. A set without `x` only records reps.
fn parse_exercise(value: &str) -> Result<Exercise, String> {
    let (name, sets) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("Invalid exercise '{}'. Use \"Name:KGxREPS,...\".", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Exercise name missing in '{}'", value));
    }

    let sets: Vec<SetEntry> = sets
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|set| match set.split_once(['x', 'X']) {
            Some((kg, reps)) => SetEntry::new(kg.trim(), reps.trim()),
            None => SetEntry::new("", set),
        })
        .collect();
    if sets.is_empty() {
        return Err(format!("Exercise '{}' has no sets", name));
    }
    Ok(Exercise::new(name, sets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exercise() {
        let e = parse_exercise("Press banca:65x5, 67.5x5").unwrap();
        assert_eq!(e.name, "Press banca");
        assert_eq!(e.sets.len(), 2);
        assert_eq!(e.sets[1].weight(), Some(67.5));
        assert_eq!(e.sets[1].rep_count(), Some(5));
    }

    #[test]
    fn test_parse_exercise_reps_only() {
        let e = parse_exercise("Dominadas:8,6").unwrap();
        assert_eq!(e.sets[0].kg, "");
        assert_eq!(e.sets[0].reps, "8");
        assert!(e.max_kg() == 0.0);
    }

    #[test]
    fn test_parse_exercise_errors() {
        assert!(parse_exercise("Sentadilla").is_err());
        assert!(parse_exercise(":60x5").is_err());
        assert!(parse_exercise("Sentadilla:").is_err());
    }
}
