mod common;

use approx::assert_relative_eq;
use common::{expected_cost, transport_fixture};
use scenariodb::{InstanceState, ModelError, ModelInstance, ModelStatus, Modifier};

fn objective(mi: &ModelInstance) -> f64 {
    mi.sync_store().unwrap().levels("z", &[]).unwrap().level
}

fn instantiated(fixture: &common::Fixture) -> ModelInstance {
    let mut mi = fixture.checkpoint.add_model_instance(Some("source")).unwrap();
    let bmult = mi
        .sync_store_mut()
        .unwrap()
        .add_parameter("bmult", 0, "")
        .unwrap();
    mi.instantiate("transport use lp min z", None, &[Modifier::parameter(&bmult).unwrap()])
        .unwrap();
    mi
}

#[test]
fn test_copy_solves_independently() {
    let fixture = transport_fixture();
    let mut source = instantiated(&fixture);
    let mut copy = source.copy(Some("copy")).unwrap();

    assert_eq!(copy.state().unwrap(), InstanceState::Instantiated);
    assert_eq!(copy.name().unwrap(), "copy");
    assert_ne!(copy.scratch_dir().unwrap(), source.scratch_dir().unwrap());
    assert_ne!(copy.sync_store().unwrap().id(), source.sync_store().unwrap().id());
    assert_eq!(copy.selected_solver().unwrap(), "mincost");

    source
        .sync_store_mut()
        .unwrap()
        .set_value("bmult", &[], 0.6)
        .unwrap();
    copy.sync_store_mut()
        .unwrap()
        .set_value("bmult", &[], 0.9)
        .unwrap();

    source.solve().unwrap();
    copy.solve().unwrap();
    assert_relative_eq!(objective(&source), expected_cost(0.6), epsilon = 1e-6);
    assert_relative_eq!(objective(&copy), expected_cost(0.9), epsilon = 1e-6);

    // Solving the copy again leaves the source's results alone.
    copy.sync_store_mut()
        .unwrap()
        .set_value("bmult", &[], 1.2)
        .unwrap();
    copy.solve().unwrap();
    assert_eq!(copy.model_status().unwrap(), ModelStatus::InfeasibleGlobal);
    assert_eq!(source.model_status().unwrap(), ModelStatus::OptimalGlobal);
    assert_relative_eq!(objective(&source), expected_cost(0.6), epsilon = 1e-6);
}

#[test]
fn test_copy_carries_store_contents_and_modifiers() {
    let fixture = transport_fixture();
    let mut source = instantiated(&fixture);
    source
        .sync_store_mut()
        .unwrap()
        .set_value("bmult", &[], 0.7)
        .unwrap();

    let mut copy = source.copy(None).unwrap();
    let store = copy.sync_store().unwrap();
    assert_eq!(store.value("bmult", &[]).unwrap(), 0.7);

    let modifiers = copy.modifiers().unwrap();
    assert_eq!(modifiers.len(), 1);
    assert!(modifiers[0].is_parameter());
    assert_eq!(modifiers[0].symbol().store(), store.id());

    copy.solve().unwrap();
    assert_relative_eq!(objective(&copy), expected_cost(0.7), epsilon = 1e-6);

    // The copied store is symbol-locked like any instantiated store.
    let err = copy
        .sync_store_mut()
        .unwrap()
        .add_parameter("extra", 0, "")
        .unwrap_err();
    assert!(matches!(err, ModelError::StateViolation(_)));
}

#[test]
fn test_copy_requires_instantiated_source() {
    let fixture = transport_fixture();
    let source = fixture.checkpoint.add_model_instance(None).unwrap();
    let err = source.copy(None).unwrap_err();
    assert!(matches!(err, ModelError::StateViolation(_)));
}

#[test]
fn test_copy_name_must_be_free() {
    let fixture = transport_fixture();
    let source = instantiated(&fixture);
    let err = source.copy(Some("source")).unwrap_err();
    assert!(matches!(err, ModelError::NameCollision { .. }));
}

#[test]
fn test_empty_copy_name_generates_one() {
    let fixture = transport_fixture();
    let mut source = instantiated(&fixture);
    let checkpoint_file = fixture.checkpoint.file_name().unwrap().to_path_buf();

    let mut copy = source.copy(Some("")).unwrap();
    assert!(copy.name().unwrap().starts_with("_scenario_mi"));
    assert_eq!(
        copy.scratch_dir().unwrap().parent(),
        Some(fixture.workspace.working_directory())
    );

    assert!(checkpoint_file.is_file());
    assert!(source.scratch_dir().unwrap().is_dir());
    source.solve().unwrap();
    copy.solve().unwrap();
    assert_eq!(source.model_status().unwrap(), ModelStatus::OptimalGlobal);
    assert_eq!(copy.model_status().unwrap(), ModelStatus::OptimalGlobal);
}

#[test]
fn test_path_like_copy_names_are_rejected() {
    let fixture = transport_fixture();
    let mut source = instantiated(&fixture);
    let checkpoint_file = fixture.checkpoint.file_name().unwrap().to_path_buf();

    for name in ["..", ".", "nested/copy"] {
        let err = source.copy(Some(name)).unwrap_err();
        assert!(matches!(err, ModelError::InvalidArgument(_)), "{name}");
    }
    assert!(checkpoint_file.is_file());
    source.solve().unwrap();
    assert_eq!(source.model_status().unwrap(), ModelStatus::OptimalGlobal);
}

#[test]
fn test_failed_copy_removes_its_scratch_dir() {
    let fixture = transport_fixture();
    let source = instantiated(&fixture);
    std::fs::remove_dir_all(source.scratch_dir().unwrap()).unwrap();

    let err = source.copy(Some("broken")).unwrap_err();
    assert!(matches!(err, ModelError::Native { .. }));
    assert!(!fixture.workspace.working_directory().join("broken").exists());
    assert!(fixture.checkpoint.file_name().unwrap().is_file());
}
