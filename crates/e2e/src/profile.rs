//! Platform profiles (role contexts within an authenticated session)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Profile {
    Gestor,
    Hospital,
    #[serde(rename = "Médico", alias = "Medico", alias = "medico")]
    Medico,
    Paciente,
}

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::Gestor,
        Profile::Hospital,
        Profile::Medico,
        Profile::Paciente,
    ];

    /// Label used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Gestor => "Gestor",
            Profile::Hospital => "Hospital",
            Profile::Medico => "Médico",
            Profile::Paciente => "Paciente",
        }
    }

    /// Path segment of the profile's dashboard
    pub fn dashboard_slug(&self) -> &'static str {
        match self {
            Profile::Gestor => "gestor",
            Profile::Hospital => "hospital",
            Profile::Medico => "medico",
            Profile::Paciente => "paciente",
        }
    }

    pub fn dashboard_path(&self) -> String {
        format!("/dashboard/{}", self.dashboard_slug())
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gestor" => Ok(Profile::Gestor),
            "hospital" => Ok(Profile::Hospital),
            "médico" | "medico" => Ok(Profile::Medico),
            "paciente" => Ok(Profile::Paciente),
            other => Err(format!("unknown profile: {}", other)),
        }
    }
}
