//! Unit tests for partitions and the register index

use graphcomp::checker;
use graphcomp::store::builder;
use graphcomp::{Error, InvariantViolation, Partition, RectId, Rectangle, WeightStore};

fn ones_4x4() -> WeightStore {
    let mut store = WeightStore::new(vec![4, 4]).unwrap();
    for i in 0..4 {
        for j in 0..4 {
            store.insert(&[i, j], 1.0).unwrap();
        }
    }
    store
}

#[test]
fn test_macro_partition_is_one_full_rectangle() {
    let mut partition = Partition::new(vec![4, 4]).unwrap();
    partition.macro_partition();
    assert_eq!(partition.rsize(), 1);
    let id = partition.ids()[0];
    assert_eq!(partition[id].size(), 16);
    for d in 0..2 {
        for i in 0..4 {
            assert_eq!(partition.register(d, i), &[id]);
        }
    }
    assert_eq!(checker::check_all(&partition, None), Ok(()));
}

#[test]
fn test_micro_partition_covers_nonzero_cells() {
    let store = ones_4x4();
    let mut partition = Partition::for_store(&store).unwrap();
    partition.micro_partition(&store).unwrap();
    assert_eq!(partition.rsize(), 16);
    for d in 0..2 {
        for i in 0..4 {
            assert_eq!(partition.register(d, i).len(), 4);
        }
    }
    assert_eq!(checker::check_all(&partition, Some(&store)), Ok(()));
}

#[test]
fn test_micro_partition_skips_empty_cells() {
    let store = builder::multiscale_sparse(1).unwrap();
    let mut partition = Partition::for_store(&store).unwrap();
    partition.micro_partition(&store).unwrap();
    assert_eq!(partition.rsize(), store.edges());
    assert!(partition.rsize() < 64);
    assert_eq!(checker::check_all(&partition, Some(&store)), Ok(()));
    // without the store every grid cell must be covered
    assert!(matches!(
        checker::check_all(&partition, None),
        Err(InvariantViolation::MissingCell { .. })
    ));
}

#[test]
fn test_micro_partition_rejects_other_grid() {
    let store = ones_4x4();
    let mut partition = Partition::new(vec![4, 5]).unwrap();
    assert!(matches!(
        partition.micro_partition(&store),
        Err(Error::Dimension(_))
    ));
}

#[test]
fn test_add_validates_rectangles() {
    let mut partition = Partition::new(vec![3, 3]).unwrap();
    let outside = Rectangle::new(vec![vec![0, 3], vec![1]]).unwrap();
    assert!(partition.add(outside).is_err());
    let wrong_arity = Rectangle::new(vec![vec![0], vec![1], vec![2]]).unwrap();
    assert!(partition.add(wrong_arity).is_err());
    let ok = Rectangle::new(vec![vec![0, 2], vec![1]]).unwrap();
    let id = partition.add(ok).unwrap();
    assert_eq!(partition.register(0, 2), &[id]);
    assert!(partition.register(0, 1).is_empty());
}

#[test]
fn test_apply_edit_keeps_registers_in_step() {
    let mut partition = Partition::new(vec![4, 4]).unwrap();
    partition.macro_partition();
    let whole = partition.ids()[0];
    let left = Rectangle::new(vec![vec![0, 1, 2, 3], vec![0, 1]]).unwrap();
    let right = Rectangle::new(vec![vec![0, 1, 2, 3], vec![2, 3]]).unwrap();
    let new_ids = partition.apply_edit(&[whole], vec![left, right]);

    assert_eq!(new_ids.len(), 2);
    assert_eq!(partition.rsize(), 2);
    assert_eq!(partition.register(1, 0), &[new_ids[0]]);
    assert_eq!(partition.register(1, 3), &[new_ids[1]]);
    assert_eq!(partition.register(0, 2).len(), 2);
    assert_eq!(checker::check_all(&partition, None), Ok(()));
}

#[test]
fn test_build_r_is_idempotent() {
    let store = ones_4x4();
    let mut partition = Partition::for_store(&store).unwrap();
    partition.micro_partition(&store).unwrap();
    let before = partition.copy_partition();

    partition.build_r();
    assert_eq!(partition.rsize(), 16);
    partition.build_r();
    assert_eq!(partition.rsize(), 16);

    let mut after = partition.copy_partition();
    let mut expected = before;
    after.rects.sort_by(|a, b| a.components().cmp(b.components()));
    expected.rects.sort_by(|a, b| a.components().cmp(b.components()));
    assert_eq!(after, expected);
    assert_eq!(checker::check_all(&partition, Some(&store)), Ok(()));
}

#[test]
fn test_reg_of_r_restores_cleaned_registers() {
    let mut partition = Partition::new(vec![3, 2]).unwrap();
    partition.micro_grid();
    let registers = partition.registers().to_vec();
    partition.clean_registers();
    assert!(partition.register(0, 0).is_empty());
    assert!(checker::check_register_freshness(&partition).is_err());
    partition.reg_of_r();
    assert_eq!(partition.registers(), registers.as_slice());
    assert_eq!(checker::check_all(&partition, None), Ok(()));
}

#[test]
fn test_clean_r_empties_everything() {
    let mut partition = Partition::new(vec![3, 3]).unwrap();
    partition.micro_grid();
    partition.clean_r();
    assert!(partition.is_empty());
    assert_eq!(partition.rsize(), 0);
    assert!(partition.registers().iter().flatten().all(Vec::is_empty));
}

#[test]
fn test_copy_and_restore() {
    let mut partition = Partition::new(vec![4, 3]).unwrap();
    partition.micro_grid();
    let snapshot = partition.copy_partition();
    assert_eq!(snapshot.len(), 12);

    partition.macro_partition();
    assert_eq!(partition.rsize(), 1);
    partition.restore(&snapshot).unwrap();
    assert_eq!(partition.rsize(), 12);
    assert_eq!(checker::check_all(&partition, None), Ok(()));

    let mut other = Partition::new(vec![3, 4]).unwrap();
    assert!(other.restore(&snapshot).is_err());
}

#[test]
fn test_from_rectangles_detects_overlap() {
    let a = Rectangle::new(vec![vec![0, 1], vec![0, 1]]).unwrap();
    let b = Rectangle::new(vec![vec![1], vec![1, 2]]).unwrap();
    let partition = Partition::from_rectangles(vec![3, 3], vec![a, b]).unwrap();
    assert!(matches!(
        checker::check_packing(&partition),
        Err(InvariantViolation::DuplicateCell { .. })
    ));
    assert!(checker::check_register_overlap(&partition).is_err());
}

#[test]
fn test_index_by_rect_id() {
    let mut partition = Partition::new(vec![2, 2]).unwrap();
    partition.macro_partition();
    let id = partition.ids()[0];
    assert_eq!(partition[id].sizes(), &[2, 2]);
    assert!(partition.get(RectId::from_usize(99)).is_none());
}
