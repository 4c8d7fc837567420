//! Unit tests for sessions: resets, snapshots and verification

use graphcomp::store::builder;
use graphcomp::{Error, InvariantViolation, ObjectiveConfig, OperatorConfig, Rectangle, Session};

#[test]
fn test_resets_rescore() {
    let store = builder::small_tester().unwrap();
    let mut session = Session::new(
        &store,
        OperatorConfig::default().with_seed(1),
        ObjectiveConfig::default(),
    )
    .unwrap();
    let macro_cost = session.cost();

    let micro = session.micro_partition().unwrap();
    assert_eq!(micro.rsize, 16);
    session.verify().unwrap();

    let back = session.macro_partition().unwrap();
    assert_eq!(back.rsize, 1);
    assert_eq!(back.cost, macro_cost);
}

#[test]
fn test_commit_without_candidate() {
    let store = builder::small_tester().unwrap();
    let mut session = Session::new(
        &store,
        OperatorConfig::default().with_seed(1),
        ObjectiveConfig::default(),
    )
    .unwrap();
    assert!(matches!(session.commit(), Err(Error::NoCandidate)));
    assert!(matches!(session.do_operation(), Err(Error::NoCandidate)));
}

#[test]
fn test_restore_with_other_lambda_rescores() {
    let store = builder::small_tester().unwrap();
    let mut first = Session::new(
        &store,
        OperatorConfig::default().with_seed(3),
        ObjectiveConfig::new(1.0),
    )
    .unwrap();
    first.micro_partition().unwrap();
    let row = Rectangle::new(vec![vec![1], vec![0, 1, 2, 3]]).unwrap();
    assert!(first.apply_cluster(&row));
    first.commit().unwrap();
    let snapshot = first.copy_partition();

    let mut second = Session::new(
        &store,
        OperatorConfig::default().with_seed(3),
        ObjectiveConfig::new(8.0),
    )
    .unwrap();
    second.restore(&snapshot).unwrap();
    assert_eq!(second.rsize(), 13);
    let summary = second.summary();
    let expected = 8.0 / store.total_weight() * summary.dkl + 13.0;
    assert!((summary.cost - expected).abs() < 1e-9);
    second.verify().unwrap();
}

#[test]
fn test_verify_detects_stale_registers() {
    let store = builder::small_tester().unwrap();
    let mut session = Session::new(
        &store,
        OperatorConfig::default().with_seed(1),
        ObjectiveConfig::default(),
    )
    .unwrap();
    session.micro_partition().unwrap();
    session.clean_registers();
    assert!(matches!(
        session.verify(),
        Err(Error::Invariant(InvariantViolation::PartitionMismatch { .. }))
    ));
    session.reg_of_r();
    session.verify().unwrap();
}

#[test]
fn test_restore_uses_own_penalty_factor() {
    let store = builder::small_tester().unwrap();
    let mut first = Session::new(
        &store,
        OperatorConfig::default().with_seed(4),
        ObjectiveConfig::new(2.0),
    )
    .unwrap();
    first.micro_partition().unwrap();
    let snapshot = first.copy_partition();

    let mut second = Session::new(
        &store,
        OperatorConfig::default().with_seed(4),
        ObjectiveConfig::new(2.0).with_penalty_factor(0.25),
    )
    .unwrap();
    second.restore(&snapshot).unwrap();
    assert_eq!(second.summary().penalty, 4.0);
    assert!((second.cost() - (snapshot.summary.cost - 12.0)).abs() < 1e-9);
    second.verify().unwrap();
}

#[test]
fn test_restore_rescores_snapshot_of_other_data() {
    let banded = builder::small_tester().unwrap();
    let mut first = Session::new(
        &banded,
        OperatorConfig::default().with_seed(5),
        ObjectiveConfig::default(),
    )
    .unwrap();
    first.micro_partition().unwrap();
    let row = Rectangle::new(vec![vec![0], vec![0, 1, 2, 3]]).unwrap();
    assert!(first.apply_cluster(&row));
    first.commit().unwrap();
    let snapshot = first.copy_partition();

    let mut doubled = builder::small_tester().unwrap();
    doubled.normalize(0.5).unwrap();
    let mut second = Session::new(
        &doubled,
        OperatorConfig::default().with_seed(5),
        ObjectiveConfig::default(),
    )
    .unwrap();
    second.restore(&snapshot).unwrap();
    assert_eq!(second.rsize(), 13);
    assert!((second.summary().weight - doubled.total_weight()).abs() < 1e-9);
    second.verify().unwrap();
}
