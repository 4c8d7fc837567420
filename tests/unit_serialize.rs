//! Unit tests for store and snapshot persistence

use approx::assert_relative_eq;
use graphcomp::serialize::{load_snapshot, load_store, save_snapshot, save_store};
use graphcomp::store::builder;
use graphcomp::{Error, ObjectiveConfig, OperatorConfig, Optimizer, OptimizerConfig, Session};
use tempfile::tempdir;

#[test]
fn test_store_survives_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("graph.store");
    let store = builder::multiscale_sparse(1).unwrap();

    save_store(&store, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());

    let loaded = load_store(&path).unwrap();
    assert_eq!(loaded.dims(), store.dims());
    assert_eq!(loaded.edges(), store.edges());
    assert_eq!(loaded.nnz_cells(), store.nnz_cells());
    store.for_each_cell(|tuple, w| assert_eq!(loaded.get(tuple), w));
}

#[test]
fn test_snapshot_resumes_session() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("best.snapshot");
    let store = builder::multiscale_complete(1).unwrap();

    let mut session = Session::new(
        &store,
        OperatorConfig::default().with_seed(6),
        ObjectiveConfig::new(30.0),
    )
    .unwrap();
    session.micro_partition().unwrap();
    Optimizer::new(OptimizerConfig::default().with_nfail_limit(80))
        .gradient_descent_union(&mut session)
        .unwrap();
    let snapshot = session.copy_partition();
    save_snapshot(&snapshot, &path).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(loaded, snapshot);

    let mut resumed = Session::new(
        &store,
        OperatorConfig::default().with_seed(6),
        ObjectiveConfig::new(30.0),
    )
    .unwrap();
    resumed.restore(&loaded).unwrap();
    assert_eq!(resumed.rsize(), session.rsize());
    assert_relative_eq!(resumed.cost(), session.cost(), max_relative = 1e-9);
    assert_relative_eq!(resumed.summary().dkl, session.summary().dkl, epsilon = 1e-9, max_relative = 1e-9);
    resumed.verify().unwrap();
}

#[test]
fn test_load_rejects_garbage() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty.store");
    std::fs::write(&empty, b"").unwrap();
    assert!(matches!(load_store(&empty), Err(Error::Serialization(_))));

    let garbage = dir.path().join("garbage.store");
    std::fs::write(&garbage, [0xffu8; 64]).unwrap();
    assert!(load_store(&garbage).is_err());

    let missing = dir.path().join("missing.store");
    assert!(matches!(load_store(&missing), Err(Error::Io(_))));
}
