//! Schema declaration scenarios against the public API.

use mesh_bulk::meta::meta_data::{
    GLOBALLY_SHARED_PART_NAME, LOCALLY_OWNED_PART_NAME, UNIVERSAL_PART_NAME,
};
use mesh_bulk::prelude::*;

#[test]
fn builtin_parts_are_named_and_reserved() {
    let meta = MetaData::new(3);
    assert_eq!(meta.spatial_dimension(), 3);
    assert_eq!(meta.side_rank(), EntityRank::Face);

    for name in [
        UNIVERSAL_PART_NAME,
        LOCALLY_OWNED_PART_NAME,
        GLOBALLY_SHARED_PART_NAME,
    ] {
        let part = meta.expect_part(name).unwrap();
        assert!(meta.is_builtin_part(part));
        assert_eq!(meta.part(part).rank(), None);
    }
}

#[test]
fn a_typical_schema_commits_cleanly() {
    let mut meta = MetaData::new(3);
    let block = meta
        .declare_part_with_topology("block_1", CellTopology::Hex8)
        .unwrap();
    let boundary = meta.declare_part("boundary", Some(EntityRank::Face)).unwrap();
    let inlet = meta
        .declare_part_with_topology("inlet", CellTopology::Quad4)
        .unwrap();
    meta.declare_subset(boundary, inlet).unwrap();

    let velocity = meta
        .declare_field::<f64>("velocity", EntityRank::Node, 2)
        .unwrap();
    let universal = meta.universal_part();
    meta.put_field_on_part::<f64>(velocity, universal, 3, Some(&[0.0, 0.0, 0.0]))
        .unwrap();

    meta.commit();

    assert_eq!(meta.part(block).topology(), Some(CellTopology::Hex8));
    assert_eq!(meta.part(block).rank(), Some(EntityRank::Element));
    assert_eq!(meta.part(inlet).rank(), Some(EntityRank::Face));
    assert_eq!(meta.supersets_transitive(inlet), vec![boundary]);
    assert_eq!(meta.field(velocity).num_states(), 2);
    assert_eq!(meta.field(velocity).components_for(&[universal]), Some(3));

    // a committed schema rejects new declarations but stays idempotent
    assert!(matches!(
        meta.declare_part("latecomer", None),
        Err(MeshBulkError::SchemaCommitted)
    ));
    assert_eq!(
        meta.declare_part("boundary", Some(EntityRank::Face)).unwrap(),
        boundary
    );
}

#[test]
fn conflicting_redeclarations_are_schema_errors() {
    let mut meta = MetaData::new(3);
    meta.declare_part("zone", Some(EntityRank::Element)).unwrap();
    assert!(matches!(
        meta.declare_part("zone", None),
        Err(MeshBulkError::PartRankConflict { .. })
    ));

    meta.declare_field::<f64>("density", EntityRank::Element, 1)
        .unwrap();
    assert!(matches!(
        meta.declare_field::<u64>("density", EntityRank::Element, 1),
        Err(MeshBulkError::FieldDeclarationConflict { .. })
    ));
}

#[test]
fn field_state_counts_are_range_checked() {
    let mut meta = MetaData::new(3);
    assert!(matches!(
        meta.declare_field::<f64>("history", EntityRank::Node, 0),
        Err(MeshBulkError::StateCountOutOfRange { requested: 0, .. })
    ));
    assert!(matches!(
        meta.declare_field::<f64>("history", EntityRank::Node, 7),
        Err(MeshBulkError::StateCountOutOfRange { requested: 7, .. })
    ));
    meta.declare_field::<f64>("history", EntityRank::Node, 6)
        .unwrap();
}
