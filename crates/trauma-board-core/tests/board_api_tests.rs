//! Tests for the exported board API.

use trauma_board_core::auth::AuthResult;
use trauma_board_core::{
    open_board, open_board_in_memory, AuthProvider, FfiTab, MemoryBackend, PatientStore, Session,
    TraumaBoardCore, TraumaBoardError, UrgencyThresholds,
};

#[test]
fn test_views_require_a_session() {
    let board = open_board_in_memory().unwrap();
    assert!(matches!(
        board.tab_groups(FfiTab::Board),
        Err(TraumaBoardError::Unauthenticated(_))
    ));
    assert!(matches!(
        board.add_patient(),
        Err(TraumaBoardError::Unauthenticated(_))
    ));

    let session = board.sign_in("registrar".into()).unwrap();
    assert_eq!(session.user_id, "registrar");
    assert_eq!(board.tab_groups(FfiTab::Board).unwrap().len(), 8);

    board.sign_out().unwrap();
    assert!(board.current_session().unwrap().is_none());
    assert!(board.tab_groups(FfiTab::Archive).is_err());
}

#[test]
fn test_seeding_requires_a_session() {
    let board = open_board_in_memory().unwrap();
    assert!(matches!(
        board.seed_demo_data(),
        Err(TraumaBoardError::Unauthenticated(_))
    ));

    board.sign_in("registrar".into()).unwrap();
    let board_tab = board.tab_groups(FfiTab::Board).unwrap();
    assert!(board_tab.iter().all(|group| group.rows.is_empty()));
}

#[test]
fn test_reseeding_after_deletes_takes_fresh_ids() {
    let board = open_board_in_memory().unwrap();
    board.sign_in("registrar".into()).unwrap();

    assert_eq!(board.seed_demo_data().unwrap(), 2);
    board.delete(1).unwrap();
    board.delete(2).unwrap();

    assert_eq!(board.seed_demo_data().unwrap(), 2);
    assert!(board.get_patient(1).unwrap().is_none());
    assert!(board.get_patient(2).unwrap().is_none());
    assert_eq!(board.get_patient(3).unwrap().unwrap().name, "John Doe");
    assert_eq!(board.get_patient(4).unwrap().unwrap().name, "Jane Smith");
}

struct HospitalSso;

impl AuthProvider for HospitalSso {
    fn current_session(&self) -> AuthResult<Option<Session>> {
        Ok(Some(Session::new("sso:registrar")))
    }

    fn sign_out(&self) -> AuthResult<()> {
        Ok(())
    }
}

#[test]
fn test_external_provider_gates_the_board() {
    let store = PatientStore::open(MemoryBackend::new()).unwrap();
    let board =
        TraumaBoardCore::with_auth(store, UrgencyThresholds::default(), Box::new(HospitalSso));

    let session = board.current_session().unwrap().unwrap();
    assert_eq!(session.user_id, "sso:registrar");
    assert_eq!(board.tab_groups(FfiTab::Board).unwrap().len(), 8);
    assert!(matches!(
        board.sign_in("someone".into()),
        Err(TraumaBoardError::AuthError(_))
    ));
}

#[test]
fn test_demo_data_and_board_flow() {
    let board = open_board_in_memory().unwrap();
    board.sign_in("registrar".into()).unwrap();

    assert_eq!(board.seed_demo_data().unwrap(), 2);
    assert_eq!(board.seed_demo_data().unwrap(), 0);

    let added = board.add_patient().unwrap();
    assert_eq!(added.id, 3);
    assert_eq!(added.section, "New Cases");

    board
        .edit_field(FfiTab::Board, added.id, "name".into(), "New Patient".into())
        .unwrap();
    board
        .reassign_section(added.id, "shoulder & elbow".into())
        .unwrap();

    let slot = board.theatre_slots()[1].clone();
    board.schedule(added.id, slot.key.clone()).unwrap();

    let theatre = board.tab_groups(FfiTab::Theatre).unwrap();
    let group = theatre
        .iter()
        .find(|g| g.slot_key.as_deref() == Some(slot.key.as_str()))
        .unwrap();
    assert_eq!(group.rows.len(), 1);
    assert_eq!(group.rows[0].patient.name, "New Patient");
    assert_eq!(group.rows[0].patient.section, "Shoulder & Elbow");
    assert!(group.actions.contains(&"complete".to_string()));

    board.complete(added.id).unwrap();
    let completed = board.tab_groups(FfiTab::Completed).unwrap();
    let row = &completed[0].rows[0];
    assert_eq!(row.patient.surgery_date.as_deref(), slot.key.split('-').next());
    assert!(completed[0].show_surgery_date);

    board.archive(added.id).unwrap();
    assert_eq!(board.tab_groups(FfiTab::Archive).unwrap()[0].rows.len(), 1);

    let removed = board.delete(added.id).unwrap();
    assert_eq!(removed.id, added.id);
    assert!(board.get_patient(added.id).unwrap().is_none());
}

#[test]
fn test_rejections_surface_as_errors() {
    let board = open_board_in_memory().unwrap();
    board.sign_in("registrar".into()).unwrap();
    let id = board.add_patient().unwrap().id;

    assert!(matches!(
        board.archive(id),
        Err(TraumaBoardError::Rejected(_))
    ));
    assert!(matches!(
        board.complete(999),
        Err(TraumaBoardError::NotFound(_))
    ));
    assert!(matches!(
        board.reassign_section(id, "Cardiology".into()),
        Err(TraumaBoardError::InvalidInput(_))
    ));
    assert!(matches!(
        board.edit_field(FfiTab::Board, id, "shoeSize".into(), "9".into()),
        Err(TraumaBoardError::InvalidInput(_))
    ));
    assert!(matches!(
        board.edit_date_input(FfiTab::Board, id, "name".into(), "2025-01-01".into()),
        Err(TraumaBoardError::InvalidInput(_))
    ));
}

#[test]
fn test_snapshot_json_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.db").to_string_lossy().into_owned();

    {
        let board = open_board(path.clone()).unwrap();
        board.sign_in("registrar".into()).unwrap();
        board.seed_demo_data().unwrap();
        board
            .edit_date_input(FfiTab::Board, 1, "doi".into(), "2025-05-30".into())
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&board.snapshot_json().unwrap()).unwrap();
        assert_eq!(json["board"].as_array().unwrap().len(), 8);
        assert!(board.take_failures().unwrap().is_empty());
    }

    let board = open_board(path).unwrap();
    board.sign_in("registrar".into()).unwrap();
    let patient = board.get_patient(1).unwrap().unwrap();
    assert_eq!(patient.doi, "30/05/2025");
    assert_eq!(board.seed_demo_data().unwrap(), 0);
}

#[test]
fn test_date_helpers() {
    use trauma_board_core::{display_date_to_input, format_display};

    assert_eq!(display_date_to_input("09/05/2025".into()), "2025-05-09");
    assert_eq!(display_date_to_input("soon".into()), "");
    assert_eq!(format_display(Some("2025-05-09".into())), "09/05/2025");
    assert_eq!(format_display(None), "");
}
