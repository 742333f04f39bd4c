//! Field storage: initial values, bucket slabs, aliasing, temporal states,
//! and typed-access failure modes.

use mesh_bulk::comm::NoComm;
use mesh_bulk::prelude::*;

fn pressure_meta() -> (MetaData, FieldId) {
    let mut meta = MetaData::new(3);
    let pressure = meta
        .declare_field::<f64>("pressure", EntityRank::Node, 1)
        .unwrap();
    let universal = meta.universal_part();
    meta.put_field_on_part::<f64>(pressure, universal, 1, Some(&[20.0]))
        .unwrap();
    meta.commit();
    (meta, pressure)
}

#[test]
fn init_value_fills_new_entities() {
    let (meta, pressure) = pressure_meta();
    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let a = bulk.declare_entity(EntityRank::Node).unwrap();
    let b = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    let field = bulk.field::<f64>(pressure).unwrap();
    assert_eq!(field.entity_values(a).unwrap(), &[20.0]);
    assert_eq!(field.entity_values(b).unwrap(), &[20.0]);
}

#[test]
fn bucket_slab_is_entity_major() {
    let (meta, pressure) = pressure_meta();
    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let nodes: Vec<_> = (0..5)
        .map(|_| bulk.declare_entity(EntityRank::Node).unwrap())
        .collect();
    bulk.modification_end().unwrap();

    let mut field = bulk.field_mut::<f64>(pressure).unwrap();
    for (i, &node) in nodes.iter().enumerate() {
        field.entity_values_mut(node).unwrap()[0] = i as f64;
    }
    drop(field);

    let field = bulk.field::<f64>(pressure).unwrap();
    let bucket = bulk.bucket_of(nodes[0]).unwrap();
    assert_eq!(field.components(bucket.bucket_id()), Some(1));
    let slab = field.bucket_values(bucket.bucket_id()).unwrap();
    assert_eq!(slab, &[0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn entity_and_bucket_views_alias() {
    let (meta, pressure) = pressure_meta();
    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let node = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();
    let bucket = bulk.bucket_of(node).unwrap().bucket_id();

    let mut field = bulk.field_mut::<f64>(pressure).unwrap();
    field.bucket_values_mut(bucket).unwrap()[0] = 99.0;
    assert_eq!(field.entity_values(node).unwrap(), &[99.0]);
    field.entity_values_mut(node).unwrap()[0] = -1.0;
    assert_eq!(field.bucket_values_mut(bucket).unwrap()[0], -1.0);
}

#[test]
fn restriction_scopes_storage_to_member_buckets() {
    // register a face field on one sideset only
    let mut meta = MetaData::new(3);
    let sideset = meta.declare_part("inlet", Some(EntityRank::Face)).unwrap();
    let flux = meta
        .declare_field::<f64>("flux", EntityRank::Face, 1)
        .unwrap();
    meta.put_field_on_part::<f64>(flux, sideset, 1, None).unwrap();
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let inlet_face = bulk.declare_entity(EntityRank::Face).unwrap();
    bulk.change_entity_parts(inlet_face, &[sideset], &[])
        .unwrap();
    let other_face = bulk.declare_entity(EntityRank::Face).unwrap();
    bulk.modification_end().unwrap();

    let field = bulk.field::<f64>(flux).unwrap();
    assert!(field.entity_values(inlet_face).is_ok());
    let plain_bucket = bulk.bucket_of(other_face).unwrap().bucket_id();
    assert_eq!(field.components(plain_bucket), None);
    assert!(matches!(
        field.entity_values(other_face),
        Err(MeshBulkError::FieldNotOnBucket(..))
    ));
}

#[test]
fn state_rotation_preserves_history_without_copies() {
    let mut meta = MetaData::new(3);
    let temp = meta
        .declare_field::<f64>("temperature", EntityRank::Node, 3)
        .unwrap();
    let universal = meta.universal_part();
    meta.put_field_on_part::<f64>(temp, universal, 1, Some(&[5.0]))
        .unwrap();
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let node = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    bulk.field_mut::<f64>(temp)
        .unwrap()
        .entity_values_mut(node)
        .unwrap()[0] = 1.0;
    bulk.update_field_states().unwrap();

    // last step's value moved to N; the recycled current slot shows init
    let now = bulk.field::<f64>(temp).unwrap();
    assert_eq!(now.entity_values(node).unwrap(), &[5.0]);
    let previous = bulk.field_state::<f64>(temp, FieldState::N).unwrap();
    assert_eq!(previous.entity_values(node).unwrap(), &[1.0]);

    bulk.field_mut::<f64>(temp)
        .unwrap()
        .entity_values_mut(node)
        .unwrap()[0] = 2.0;
    bulk.update_field_states().unwrap();

    let previous = bulk.field_state::<f64>(temp, FieldState::N).unwrap();
    assert_eq!(previous.entity_values(node).unwrap(), &[2.0]);
    let older = bulk.field_state::<f64>(temp, FieldState::Nm1).unwrap();
    assert_eq!(older.entity_values(node).unwrap(), &[1.0]);
}

#[test]
fn full_rotation_restores_every_state() {
    let mut meta = MetaData::new(3);
    let temp = meta
        .declare_field::<f64>("temperature", EntityRank::Node, 3)
        .unwrap();
    let universal = meta.universal_part();
    meta.put_field_on_part::<f64>(temp, universal, 1, None).unwrap();
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let node = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    for (state, value) in [
        (FieldState::New, 10.0),
        (FieldState::N, 11.0),
        (FieldState::Nm1, 12.0),
    ] {
        bulk.field_state_mut::<f64>(temp, state)
            .unwrap()
            .entity_values_mut(node)
            .unwrap()[0] = value;
    }
    for _ in 0..3 {
        bulk.update_field_states().unwrap();
    }
    for (state, value) in [
        (FieldState::New, 10.0),
        (FieldState::N, 11.0),
        (FieldState::Nm1, 12.0),
    ] {
        let field = bulk.field_state::<f64>(temp, state).unwrap();
        assert_eq!(field.entity_values(node).unwrap(), &[value]);
    }
}

#[test]
fn typed_access_enforces_declared_type_and_states() {
    let (meta, pressure) = pressure_meta();
    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    assert!(matches!(
        bulk.field::<i32>(pressure),
        Err(MeshBulkError::FieldTypeMismatch { .. })
    ));
    assert!(matches!(
        bulk.field_state::<f64>(pressure, FieldState::N),
        Err(MeshBulkError::InvalidFieldState { .. })
    ));
}

#[test]
fn integer_fields_round_trip() {
    let mut meta = MetaData::new(3);
    let flags = meta
        .declare_field::<i32>("flags", EntityRank::Node, 1)
        .unwrap();
    let ids = meta
        .declare_field::<u64>("ids", EntityRank::Node, 1)
        .unwrap();
    let universal = meta.universal_part();
    meta.put_field_on_part::<i32>(flags, universal, 2, Some(&[-1, 7]))
        .unwrap();
    meta.put_field_on_part::<u64>(ids, universal, 1, None).unwrap();
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let node = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    let f = bulk.field::<i32>(flags).unwrap();
    assert_eq!(f.entity_values(node).unwrap(), &[-1, 7]);
    // no init registered: zero filled
    let g = bulk.field::<u64>(ids).unwrap();
    assert_eq!(g.entity_values(node).unwrap(), &[0]);
}

#[test]
fn rebucketing_preserves_field_values() {
    let mut meta = MetaData::new(3);
    let pressure = {
        let p = meta
            .declare_field::<f64>("pressure", EntityRank::Node, 1)
            .unwrap();
        let universal = meta.universal_part();
        meta.put_field_on_part::<f64>(p, universal, 1, Some(&[20.0]))
            .unwrap();
        p
    };
    let wet = meta.declare_part("wet", Some(EntityRank::Node)).unwrap();
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm).unwrap();
    bulk.modification_begin().unwrap();
    let a = bulk.declare_entity(EntityRank::Node).unwrap();
    let b = bulk.declare_entity(EntityRank::Node).unwrap();
    bulk.modification_end().unwrap();

    {
        let mut field = bulk.field_mut::<f64>(pressure).unwrap();
        field.entity_values_mut(a).unwrap()[0] = 1.5;
        field.entity_values_mut(b).unwrap()[0] = 2.5;
    }
    // moving `a` into a new part splits it into a different bucket
    bulk.modification_begin().unwrap();
    bulk.change_entity_parts(a, &[wet], &[]).unwrap();
    bulk.modification_end().unwrap();

    assert_ne!(
        bulk.bucket_of(a).unwrap().bucket_id(),
        bulk.bucket_of(b).unwrap().bucket_id()
    );
    let field = bulk.field::<f64>(pressure).unwrap();
    assert_eq!(field.entity_values(a).unwrap(), &[1.5]);
    assert_eq!(field.entity_values(b).unwrap(), &[2.5]);
}
