use clap::Args;

use barralibre_core::{FileKvStore, Session};

/// Show or change personal settings
#[derive(Args)]
pub struct SettingsCommand {
    /// Height in centimetres
    #[arg(long)]
    pub height: Option<f64>,

    /// Age in years
    #[arg(long)]
    pub age: Option<u32>,
}

impl SettingsCommand {
    pub fn is_update(&self) -> bool {
        self.height.is_some() || self.age.is_some()
    }

    pub fn run(&self, session: &mut Session<FileKvStore>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(height) = self.height {
            if !height.is_finite() || height <= 0.0 {
                return Err(format!("Invalid height: {}", height).into());
            }
        }

        if self.is_update() {
            let (height, age) = (self.height, self.age);
            session.update_settings(|settings| {
                if let Some(height) = height {
                    settings.height = height;
                }
                if let Some(age) = age {
                    settings.age = age;
                }
            })?;
        }

        let settings = &session.graph().settings;
        println!("height: {} cm", settings.height);
        println!("age:    {}", settings.age);
        Ok(())
    }
}
