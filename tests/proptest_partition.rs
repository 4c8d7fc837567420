//! Property tests for partition edits (geometric and scored)


use graphcomp::checker;
use graphcomp::optimizer::shuffle_partition;
use graphcomp::{ObjectiveConfig, Operator, OperatorConfig, Partition, Rectangle, Session};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The pieces of a split tile the target exactly once
    #[test]
    fn split_pieces_tile_target(
        (target, rect_box) in generators::arb_dims().prop_flat_map(|dims| {
            (generators::arb_box(dims.clone()), generators::arb_box(dims))
        })
    ) {
        let pieces = Operator::split(target.components(), rect_box.components());
        prop_assert_eq!(pieces.iter().map(|p| p.size).sum::<usize>(), target.size());
        prop_assert!(pieces.iter().filter(|p| p.inside).count() <= 1);

        let mut cells = Vec::new();
        for piece in &pieces {
            let rect = Rectangle::new(piece.components.clone()).unwrap();
            prop_assert_eq!(rect.size(), piece.size);
            prop_assert!(rect.is_subset_of(&target));
            for cell in rect.cells() {
                prop_assert_eq!(rect_box.contains(&cell), piece.inside);
                cells.push(cell);
            }
        }
        cells.sort();
        cells.dedup();
        prop_assert_eq!(cells.len(), target.size());
    }

    /// Random geometric commits never break the tiling of the grid
    #[test]
    fn shuffle_preserves_invariants(dims in generators::arb_dims(), seed in generators::arb_seed()) {
        let mut partition = Partition::new(dims).unwrap();
        partition.macro_partition();
        let mut operator =
            Operator::for_partition(&partition, OperatorConfig::default().with_seed(seed)).unwrap();
        shuffle_partition(&mut partition, &mut operator, 40).unwrap();
        prop_assert_eq!(checker::check_all(&partition, None), Ok(()));
    }

    /// Committing an arbitrary box keeps the data covered and the weight
    /// conserved
    #[test]
    fn scored_box_commit_is_consistent((store, rect_box) in generators::arb_store_and_box()) {
        let mut session = Session::new(
            &store,
            OperatorConfig::default().with_seed(0),
            ObjectiveConfig::new(2.0),
        ).unwrap();
        session.micro_partition().unwrap();
        let before = *session.summary();

        if session.apply_cluster(&rect_box) {
            let delta = session.commit().unwrap();
            prop_assert!((before.cost + delta.d_cost - session.cost()).abs() < 1e-9);
            prop_assert!(session.summary().dkl >= -1e-9);
        }
        prop_assert!((session.summary().weight - store.total_weight()).abs() < 1e-9);
        prop_assert!(session.verify().is_ok());
    }

    /// Scoring then cancelling leaves the session as it was
    #[test]
    fn cancel_is_a_no_op((store, rect_box) in generators::arb_store_and_box()) {
        let mut session = Session::new(
            &store,
            OperatorConfig::default().with_seed(1),
            ObjectiveConfig::default(),
        ).unwrap();
        let summary = *session.summary();
        let snapshot = session.copy_partition();

        if session.apply_cluster(&rect_box) {
            session.delta_cost().unwrap();
        }
        session.cancel_operation();

        prop_assert_eq!(session.summary(), &summary);
        prop_assert_eq!(session.copy_partition(), snapshot);
    }
}
