//! Firing programs and the program catalog.
//!
//! Built-in programs are compiled in and immutable. User programs live in a
//! single JSON document on disk, keyed by id; the whole document is
//! rewritten on every save or delete. Invalid persisted entries are skipped
//! with a warning at load time rather than aborting startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::TEMP_MAX_C;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("program {0} not found")]
    NotFound(u32),
    #[error("program {0} is built-in")]
    NotDeletable(u32),
    #[error("invalid program: {0}")]
    Invalid(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// One firing phase. Times are minutes, temperature is degrees Celsius,
/// vacuum is gauge kilopascals (negative requests vacuum, zero disables).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub temp: f64,
    pub time: f64,
    pub vacuum: f64,
    pub hold: f64,
    pub ramp: f64,
}

impl Step {
    /// Full step budget: ramp, soak and hold, in wall time.
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs_f64((self.ramp + self.time + self.hold) * 60.0)
    }

    pub fn wants_vacuum(&self) -> bool {
        self.vacuum < 0.0
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.temp.is_finite() || !(0.0..=TEMP_MAX_C).contains(&self.temp) {
            return Err(format!("step temperature {} out of range", self.temp));
        }
        for (label, v) in [("time", self.time), ("hold", self.hold), ("ramp", self.ramp)] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("step {} must be a non-negative number", label));
            }
        }
        if !self.vacuum.is_finite() || self.vacuum > 0.0 {
            return Err("step vacuum must be zero or negative kPa".to_string());
        }
        if self.total_duration().is_zero() {
            return Err("step has zero total duration".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramOrigin {
    Builtin,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub id: u32,
    pub name: String,
    pub steps: Vec<Step>,
    pub origin: ProgramOrigin,
}

/// On-disk shape of one user program, keyed by stringified id in the
/// surrounding document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProgram {
    name: String,
    steps: Vec<Step>,
}

pub struct ProgramCatalog {
    builtins: BTreeMap<u32, Program>,
    users: BTreeMap<u32, Program>,
    path: PathBuf,
}

impl ProgramCatalog {
    /// Open the catalog: compiled-in programs plus whatever user programs
    /// survive validation of the persisted document.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut catalog = Self {
            builtins: builtin_programs(),
            users: BTreeMap::new(),
            path,
        };
        catalog.load_users();
        catalog
    }

    fn load_users(&mut self) {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!("Failed to read user programs '{}': {}", self.path.display(), e);
                return;
            }
        };
        let doc: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&contents)
        {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("User program document is not valid JSON, ignoring: {}", e);
                return;
            }
        };
        for (key, value) in doc {
            let id: u32 = match key.parse() {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!("Skipping user program with non-numeric id '{}'", key);
                    continue;
                }
            };
            let stored: StoredProgram = match serde_json::from_value(value) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Skipping malformed user program {}: {}", id, e);
                    continue;
                }
            };
            if let Err(reason) = validate_steps(&stored.steps) {
                tracing::warn!("Skipping invalid user program {}: {}", id, reason);
                continue;
            }
            self.users.insert(
                id,
                Program {
                    id,
                    name: stored.name,
                    steps: stored.steps,
                    origin: ProgramOrigin::User,
                },
            );
        }
        tracing::info!("Loaded {} user program(s)", self.users.len());
    }

    /// All programs, built-ins first, each group ordered by id.
    pub fn list(&self) -> Vec<&Program> {
        self.builtins.values().chain(self.users.values()).collect()
    }

    pub fn get(&self, id: u32) -> Option<&Program> {
        self.builtins.get(&id).or_else(|| self.users.get(&id))
    }

    /// Validate, allocate `max(existing) + 1`, persist, return the new id.
    pub fn save_user(&mut self, name: &str, steps: Vec<Step>) -> Result<u32, CatalogError> {
        if name.trim().is_empty() {
            return Err(CatalogError::Invalid("program name is empty".to_string()));
        }
        validate_steps(&steps).map_err(CatalogError::Invalid)?;
        let id = self.next_id();
        self.users.insert(
            id,
            Program {
                id,
                name: name.to_string(),
                steps,
                origin: ProgramOrigin::User,
            },
        );
        self.persist()?;
        Ok(id)
    }

    pub fn delete_user(&mut self, id: u32) -> Result<(), CatalogError> {
        if self.builtins.contains_key(&id) {
            return Err(CatalogError::NotDeletable(id));
        }
        if self.users.remove(&id).is_none() {
            return Err(CatalogError::NotFound(id));
        }
        self.persist()
    }

    fn next_id(&self) -> u32 {
        let max_builtin = self.builtins.keys().max().copied().unwrap_or(0);
        let max_user = self.users.keys().max().copied().unwrap_or(0);
        max_builtin.max(max_user) + 1
    }

    fn persist(&self) -> Result<(), CatalogError> {
        let mut doc = serde_json::Map::new();
        for (id, program) in &self.users {
            let stored = StoredProgram {
                name: program.name.clone(),
                steps: program.steps.clone(),
            };
            doc.insert(
                id.to_string(),
                serde_json::to_value(stored)
                    .map_err(|e| CatalogError::Persistence(e.to_string()))?,
            );
        }
        let contents = serde_json::to_string_pretty(&serde_json::Value::Object(doc))
            .map_err(|e| CatalogError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| CatalogError::Persistence(e.to_string()))?;
        Ok(())
    }
}

fn validate_steps(steps: &[Step]) -> Result<(), String> {
    if steps.is_empty() {
        return Err("program has no steps".to_string());
    }
    for (i, step) in steps.iter().enumerate() {
        step.validate().map_err(|e| format!("step {}: {}", i + 1, e))?;
    }
    Ok(())
}

/// The factory firing library. Parameters follow common dental ceramic
/// schedules; ids are stable and never reused.
fn builtin_programs() -> BTreeMap<u32, Program> {
    let programs = [
        (
            1,
            "IPS e.max Crystallization",
            vec![Step { temp: 850.0, time: 25.0, vacuum: -50.0, hold: 5.0, ramp: 0.0 }],
        ),
        (
            2,
            "Feldspathic Veneer",
            vec![Step { temp: 930.0, time: 1.0, vacuum: -95.0, hold: 1.0, ramp: 6.0 }],
        ),
        (
            3,
            "Zirconia Sinter",
            vec![
                Step { temp: 900.0, time: 0.0, vacuum: 0.0, hold: 0.0, ramp: 30.0 },
                Step { temp: 1350.0, time: 120.0, vacuum: 0.0, hold: 0.0, ramp: 90.0 },
                Step { temp: 400.0, time: 0.0, vacuum: 0.0, hold: 30.0, ramp: 0.0 },
            ],
        ),
        (
            4,
            "Glaze Firing",
            vec![Step { temp: 770.0, time: 1.0, vacuum: 0.0, hold: 1.0, ramp: 8.0 }],
        ),
        (
            5,
            "Lithium Disilicate Press",
            vec![
                Step { temp: 700.0, time: 10.0, vacuum: -50.0, hold: 0.0, ramp: 6.0 },
                Step { temp: 915.0, time: 15.0, vacuum: -95.0, hold: 5.0, ramp: 10.0 },
            ],
        ),
        (
            6,
            "Wash / Opaque",
            vec![Step { temp: 820.0, time: 2.0, vacuum: -70.0, hold: 1.0, ramp: 5.0 }],
        ),
    ];
    programs
        .into_iter()
        .map(|(id, name, steps)| {
            (
                id,
                Program {
                    id,
                    name: name.to_string(),
                    steps,
                    origin: ProgramOrigin::Builtin,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_have_at_least_one_step() {
        for program in builtin_programs().values() {
            assert!(!program.steps.is_empty(), "{} has no steps", program.name);
            for step in &program.steps {
                step.validate().unwrap();
            }
        }
    }

    #[test]
    fn step_rejects_positive_vacuum() {
        let step = Step { temp: 700.0, time: 5.0, vacuum: 40.0, hold: 0.0, ramp: 0.0 };
        assert!(step.validate().is_err());
    }

    #[test]
    fn step_total_duration_is_minutes() {
        let step = Step { temp: 700.0, time: 10.0, vacuum: 0.0, hold: 2.0, ramp: 5.0 };
        assert_eq!(step.total_duration(), Duration::from_secs(17 * 60));
    }
}
