//! Shape checks for profile dashboards

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{E2eError, E2eResult};
use crate::harness::SessionHarness;
use crate::profile::Profile;
use crate::session::Session;

/// Hospital bed occupancy block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedManagement {
    pub total_beds: i64,
    pub occupied_beds: i64,
}

impl BedManagement {
    /// `0 <= occupiedBeds <= totalBeds`
    pub fn check(&self) -> E2eResult<()> {
        if self.occupied_beds < 0 || self.occupied_beds > self.total_beds {
            return Err(E2eError::AssertionFailed(format!(
                "occupiedBeds {} outside 0..={}",
                self.occupied_beds, self.total_beds
            )));
        }
        Ok(())
    }
}

fn section<'a>(body: &'a Value, key: &str) -> E2eResult<&'a Value> {
    body.get(key)
        .ok_or_else(|| E2eError::AssertionFailed(format!("dashboard has no '{}'", key)))
}

/// Validate the profile-specific parts of a dashboard payload
pub fn check_dashboard(profile: Profile, body: &Value) -> E2eResult<()> {
    let obj = body
        .as_object()
        .filter(|o| !o.is_empty())
        .ok_or_else(|| E2eError::AssertionFailed("dashboard is not a non-empty object".into()))?;

    // Layout descriptors are optional, but must be structured when present
    for key in ["sidebar", "navbar", "layout"] {
        if let Some(v) = obj.get(key) {
            if !(v.is_object() || v.is_array()) {
                return Err(E2eError::AssertionFailed(format!(
                    "dashboard '{}' descriptor is not structured",
                    key
                )));
            }
        }
    }

    match profile {
        Profile::Hospital => {
            let beds: BedManagement = serde_json::from_value(section(body, "bedManagement")?.clone())
                .map_err(|e| E2eError::AssertionFailed(format!("bedManagement: {}", e)))?;
            beds.check()
        }
        Profile::Gestor => {
            let kpis = section(body, "kpis")?
                .as_object()
                .ok_or_else(|| E2eError::AssertionFailed("kpis is not an object".into()))?;
            match kpis.iter().find(|(_, v)| !(v.is_number() || v.is_object())) {
                Some((name, _)) => Err(E2eError::AssertionFailed(format!(
                    "kpi '{}' is neither numeric nor a group",
                    name
                ))),
                None => Ok(()),
            }
        }
        Profile::Medico | Profile::Paciente => Ok(()),
    }
}

impl SessionHarness {
    /// GET the profile's dashboard and return its JSON body
    pub async fn fetch_dashboard(&self, session: &Session, profile: Profile) -> E2eResult<Value> {
        let resp = self
            .request(session, Method::GET, &profile.dashboard_path(), None)
            .await?;
        resp.expect_status(&[200])?;
        resp.json_value()
    }
}
