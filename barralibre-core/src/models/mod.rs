mod body_log;
mod graph;
mod lenient;
mod program;
mod record;
mod settings;
mod workout;

pub use body_log::{is_measure_name, BodyLog, RESERVED_KEYS};
pub use graph::{DataGraph, DEFAULT_PHASE, DEFAULT_PROGRAM};
pub use program::{ExerciseTemplate, PhaseTemplate, ProgramDefinition, ProgramMeta};
pub use record::{Record, RecordId};
pub use settings::{Settings, DEFAULT_AGE, DEFAULT_HEIGHT_CM};
pub use workout::{detect_prs, Exercise, PersonalRecord, SetEntry, Workout};
