//! Program catalog: built-ins, validation, id allocation, persistence.

mod common;

use kiln_rs::program::{CatalogError, ProgramCatalog, Step};
use kiln_rs::ProgramOrigin;

fn step(temp: f64) -> Step {
    Step {
        temp,
        time: 10.0,
        vacuum: 0.0,
        hold: 2.0,
        ramp: 5.0,
    }
}

#[test]
fn builtins_present_and_immutable() {
    let mut catalog = ProgramCatalog::open(common::scratch_programs_path());
    let ips = catalog.get(1).expect("program 1 exists");
    assert_eq!(ips.name, "IPS e.max Crystallization");
    assert_eq!(ips.origin, ProgramOrigin::Builtin);
    assert!(!ips.steps.is_empty());

    assert!(matches!(
        catalog.delete_user(1),
        Err(CatalogError::NotDeletable(1))
    ));
}

#[test]
fn delete_missing_program_is_not_found() {
    let mut catalog = ProgramCatalog::open(common::scratch_programs_path());
    assert!(matches!(
        catalog.delete_user(4242),
        Err(CatalogError::NotFound(4242))
    ));
}

#[test]
fn save_allocates_past_the_highest_existing_id() {
    let path = common::scratch_programs_path();
    let mut catalog = ProgramCatalog::open(&path);
    let first = catalog.save_user("A", vec![step(700.0)]).unwrap();
    assert_eq!(first, 7);
    let second = catalog.save_user("B", vec![step(750.0)]).unwrap();
    assert_eq!(second, 8);

    // Deleting 7 does not free its slot for reuse.
    catalog.delete_user(7).unwrap();
    let third = catalog.save_user("C", vec![step(800.0)]).unwrap();
    assert_eq!(third, 9);
}

#[test]
fn save_rejects_malformed_programs() {
    let mut catalog = ProgramCatalog::open(common::scratch_programs_path());
    assert!(matches!(
        catalog.save_user("Empty", vec![]),
        Err(CatalogError::Invalid(_))
    ));
    assert!(matches!(
        catalog.save_user("", vec![step(700.0)]),
        Err(CatalogError::Invalid(_))
    ));
    let positive_vacuum = Step { vacuum: 30.0, ..step(700.0) };
    assert!(matches!(
        catalog.save_user("Bad vacuum", vec![positive_vacuum]),
        Err(CatalogError::Invalid(_))
    ));
    let too_hot = Step { temp: 2000.0, ..step(700.0) };
    assert!(matches!(
        catalog.save_user("Too hot", vec![too_hot]),
        Err(CatalogError::Invalid(_))
    ));
}

#[test]
fn saved_programs_survive_restart() {
    let path = common::scratch_programs_path();
    let steps = vec![step(700.0)];
    let id = {
        let mut catalog = ProgramCatalog::open(&path);
        catalog.save_user("Overnight Bisque", steps.clone()).unwrap()
    };

    // A fresh catalog on the same document sees the same program.
    let reopened = ProgramCatalog::open(&path);
    let restored = reopened.get(id).expect("persisted program reloads");
    assert_eq!(restored.name, "Overnight Bisque");
    assert_eq!(restored.steps, steps);
    assert_eq!(restored.origin, ProgramOrigin::User);
}

#[test]
fn invalid_persisted_entries_are_skipped_not_fatal() {
    let path = common::scratch_programs_path();
    let doc = serde_json::json!({
        "7": { "name": "Good", "steps": [{ "temp": 700.0, "time": 10.0, "vacuum": 0.0, "hold": 2.0, "ramp": 5.0 }] },
        "8": { "name": "No steps", "steps": [] },
        "banana": { "name": "Bad key", "steps": [] },
        "9": { "name": "Wrong shape" }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let catalog = ProgramCatalog::open(&path);
    assert!(catalog.get(7).is_some());
    assert!(catalog.get(8).is_none());
    assert!(catalog.get(9).is_none());
    // Six built-ins plus the one survivor.
    assert_eq!(catalog.list().len(), 7);
}
