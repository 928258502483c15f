//! Mode Registry Integration Tests
//!
//! Verifies the registry's CRUD contract and ownership rules:
//! - validation failures reject before any write
//! - system-owned modes are immutable but cloneable
//! - the registry always yields a default mode

use issueflow::models::mode::{ModeCreateRequest, ModeUpdateRequest, PromptSections, QueryPatterns};
use issueflow::models::preferences::UserPreferences;
use issueflow::services::modes::ModeService;
use issueflow::services::preferences::PreferenceService;
use issueflow::storage::Database;
use issueflow::utils::error::AppError;

fn setup() -> (Database, ModeService) {
    let db = Database::new_in_memory().unwrap();
    let service = ModeService::from_database(&db);
    service.seed_builtins().unwrap();
    (db, service)
}

fn user_mode(name: &str) -> ModeCreateRequest {
    ModeCreateRequest {
        name: name.to_string(),
        display_name: name.to_string(),
        description: Some("test mode".to_string()),
        query_patterns: QueryPatterns {
            keywords: vec!["roadmap".to_string()],
            regex: vec![],
            priority: 3,
        },
        prompt_sections: PromptSections {
            formatting: "Respond as a roadmap outline.".to_string(),
            behavior: None,
            constraints: None,
        },
        is_default: false,
        owner_id: Some("user-1".to_string()),
    }
}

// ============================================================================
// Bootstrapping
// ============================================================================

#[test]
fn test_registry_is_bootstrapped_and_never_empty() {
    let (_db, service) = setup();
    let modes = service.list().unwrap();
    assert!(!modes.is_empty());
    assert!(modes.iter().all(|m| m.is_system()));
    // Exactly one builtin carries the default flag
    assert_eq!(modes.iter().filter(|m| m.is_default).count(), 1);
}

#[test]
fn test_get_default_never_fails_after_seed() {
    let (_db, service) = setup();
    let default = service.get_default().unwrap();
    assert!(default.is_default);
}

// ============================================================================
// Create validation
// ============================================================================

#[test]
fn test_create_validates_before_writing() {
    let (_db, service) = setup();
    let count_before = service.list().unwrap().len();

    let mut bad = user_mode("bad");
    bad.prompt_sections.formatting = String::new();
    assert!(matches!(
        service.create(bad).unwrap_err(),
        AppError::Validation(_)
    ));

    // Name collision with a builtin
    let mut collision = user_mode("table");
    collision.owner_id = Some("user-1".to_string());
    assert!(matches!(
        service.create(collision).unwrap_err(),
        AppError::Validation(_)
    ));

    // Neither rejected request left a row behind
    assert_eq!(service.list().unwrap().len(), count_before);
}

// ============================================================================
// Ownership rules
// ============================================================================

#[test]
fn test_system_modes_are_immutable() {
    let (_db, service) = setup();
    let table = service
        .list()
        .unwrap()
        .into_iter()
        .find(|m| m.name == "table")
        .unwrap();

    assert!(matches!(
        service
            .update(&table.id, ModeUpdateRequest::default())
            .unwrap_err(),
        AppError::Permission(_)
    ));
    assert!(matches!(
        service.delete(&table.id).unwrap_err(),
        AppError::Permission(_)
    ));

    // Still present and unchanged
    let reloaded = service.get(&table.id).unwrap().unwrap();
    assert_eq!(reloaded, table);
}

#[test]
fn test_unknown_ids_are_not_found() {
    let (_db, service) = setup();
    assert!(matches!(
        service.update("ghost", ModeUpdateRequest::default()).unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        service.delete("ghost").unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        service.clone_mode("ghost", "user-1").unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[test]
fn test_user_mode_lifecycle() {
    let (_db, service) = setup();
    let created = service.create(user_mode("roadmap")).unwrap();

    let updated = service
        .update(
            &created.id,
            ModeUpdateRequest {
                display_name: Some("Roadmap View".to_string()),
                query_patterns: Some(QueryPatterns {
                    keywords: vec!["roadmap".to_string(), "plan".to_string()],
                    regex: vec![],
                    priority: 7,
                }),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.display_name, "Roadmap View");
    assert_eq!(updated.query_patterns.priority, 7);

    service.delete(&created.id).unwrap();
    assert!(service.get(&created.id).unwrap().is_none());
}

// ============================================================================
// Cloning
// ============================================================================

#[test]
fn test_clone_system_mode_under_new_owner() {
    let (_db, service) = setup();
    let table = service
        .list()
        .unwrap()
        .into_iter()
        .find(|m| m.name == "table")
        .unwrap();

    let clone = service.clone_mode(&table.id, "user-1").unwrap();
    assert_eq!(clone.owner_id.as_deref(), Some("user-1"));
    assert_eq!(clone.prompt_sections, table.prompt_sections);
    assert_eq!(clone.query_patterns, table.query_patterns);
    assert!(!clone.is_default);
    assert_ne!(clone.name, table.name);

    // Clones are freely editable and deletable
    service
        .update(
            &clone.id,
            ModeUpdateRequest {
                display_name: Some("Mine".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    service.delete(&clone.id).unwrap();
}

#[test]
fn test_repeated_clones_stay_unique() {
    let (_db, service) = setup();
    let mut names = std::collections::HashSet::new();
    for _ in 0..3 {
        let clone = service.clone_mode("builtin-summary", "user-1").unwrap();
        assert!(names.insert(clone.name));
    }
}

// ============================================================================
// Default selection and preferences
// ============================================================================

#[test]
fn test_first_flagged_default_wins_by_registration_order() {
    let (_db, service) = setup();
    let mut late_default = user_mode("late-default");
    late_default.is_default = true;
    service.create(late_default).unwrap();

    // The builtin default registered first, so it still wins
    assert_eq!(service.get_default().unwrap().name, "default");
}

#[test]
fn test_preferences_upsert_round_trip() {
    let (db, service) = setup();
    let prefs_service = PreferenceService::from_database(&db);

    // Absent user gets defaults
    let defaults = prefs_service.get("user-9").unwrap();
    assert!(defaults.auto_detect_mode);
    assert!(defaults.default_output_mode_id.is_none());

    let table = service
        .list()
        .unwrap()
        .into_iter()
        .find(|m| m.name == "table")
        .unwrap();

    let mut prefs = UserPreferences::for_user("user-9");
    prefs.default_output_mode_id = Some(table.id.clone());
    prefs.auto_detect_mode = false;
    prefs_service.update(&prefs).unwrap();
    assert_eq!(prefs_service.get("user-9").unwrap(), prefs);

    // Upsert on change (last write wins)
    prefs.default_output_mode_id = None;
    prefs_service.update(&prefs).unwrap();
    assert!(prefs_service
        .get("user-9")
        .unwrap()
        .default_output_mode_id
        .is_none());
}
