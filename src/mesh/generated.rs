//! Structured hexahedral box meshes for tests and demos.
//!
//! `generate_box(nx, ny, nz)` builds an `nx x ny x nz` grid of unit Hex8
//! elements with the full downward closure (faces, edges, nodes), grid-ordered
//! global identifiers for nodes and elements, boundary faces sorted into six
//! sideset parts, and a `coordinates` node field.

use hashbrown::HashMap;
use itertools::iproduct;
use log::debug;

use crate::comm::NoComm;
use crate::mesh::bulk::BulkData;
use crate::mesh::entity::{Entity, EntityId};
use crate::mesh_error::MeshBulkError;
use crate::meta::field::FieldId;
use crate::meta::meta_data::MetaData;
use crate::meta::part::PartId;
use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Name of the node coordinates field created by the generator.
pub const COORDINATES_FIELD_NAME: &str = "coordinates";

/// Parts and fields declared by [`generate_box`].
pub struct BoxMeshHandles {
    /// The element block holding every hex.
    pub block: PartId,
    /// Sideset parts `surface_1` .. `surface_6`, indexed by element face
    /// ordinal of the boundary they cover.
    pub surfaces: [PartId; 6],
    /// `f64` node field with one component per spatial dimension.
    pub coordinates: FieldId,
}

/// Build a serial box mesh of `nx x ny x nz` Hex8 elements.
///
/// Node and element identifiers are grid ordered starting at 1 (x fastest,
/// then y, then z); edge and face identifiers are assigned when the build
/// cycle ends. Faces and edges shared between elements are created once.
///
/// # Errors
/// [`MeshBulkError::InvalidBoxExtents`] if any extent is zero.
pub fn generate_box(
    nx: usize,
    ny: usize,
    nz: usize,
) -> Result<(BulkData<NoComm>, BoxMeshHandles), MeshBulkError> {
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(MeshBulkError::InvalidBoxExtents(nx, ny, nz));
    }

    let mut meta = MetaData::new(3);
    let block = meta.declare_part_with_topology("block_1", CellTopology::Hex8)?;
    let mut surfaces = [PartId(0); 6];
    let mut surface_quads = [PartId(0); 6];
    for side in 0..6 {
        let surface = meta.declare_part(&format!("surface_{}", side + 1), Some(EntityRank::Face))?;
        let quad = meta.declare_part_with_topology(
            &format!("surface_{}_quad4", side + 1),
            CellTopology::Quad4,
        )?;
        meta.declare_subset(surface, quad)?;
        surfaces[side] = surface;
        surface_quads[side] = quad;
    }
    let coordinates = meta.declare_field::<f64>(COORDINATES_FIELD_NAME, EntityRank::Node, 1)?;
    let universal = meta.universal_part();
    meta.put_field_on_part::<f64>(coordinates, universal, 3, None)?;
    meta.commit();

    let mut bulk = BulkData::new(meta, NoComm)?;
    bulk.modification_begin()?;

    // nodes, grid ordered
    let node_stride_y = nx + 1;
    let node_stride_z = (nx + 1) * (ny + 1);
    let mut nodes: Vec<Entity> = Vec::with_capacity(node_stride_z * (nz + 1));
    for (k, j, i) in iproduct!(0..=nz, 0..=ny, 0..=nx) {
        let id = 1 + i + j * node_stride_y + k * node_stride_z;
        nodes.push(bulk.declare_entity_with_id(EntityRank::Node, EntityId::new(id as u64)?)?);
    }
    let node_at = |i: usize, j: usize, k: usize| nodes[i + j * node_stride_y + k * node_stride_z];

    // shared lower-rank entities, keyed by their sorted node identifiers
    let mut edges: HashMap<[u64; 2], Entity> = HashMap::new();
    let mut faces: HashMap<[u64; 4], Entity> = HashMap::new();

    let topology = CellTopology::Hex8;
    for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
        let element_id = 1 + i + j * nx + k * nx * ny;
        let element =
            bulk.declare_entity_with_id(EntityRank::Element, EntityId::new(element_id as u64)?)?;
        bulk.change_entity_parts(element, &[block], &[])?;

        let corners = [
            node_at(i, j, k),
            node_at(i + 1, j, k),
            node_at(i + 1, j + 1, k),
            node_at(i, j + 1, k),
            node_at(i, j, k + 1),
            node_at(i + 1, j, k + 1),
            node_at(i + 1, j + 1, k + 1),
            node_at(i, j + 1, k + 1),
        ];
        for (ordinal, &node) in corners.iter().enumerate() {
            bulk.declare_relation(element, node, ordinal as u32)?;
        }

        for ordinal in 0..topology.num_edges() {
            let pair = topology.edge_node_ordinals(ordinal);
            let edge = attach_edge(&mut bulk, &mut edges, [corners[pair[0]], corners[pair[1]]])?;
            bulk.declare_relation(element, edge, ordinal as u32)?;
        }

        for ordinal in 0..topology.num_faces() {
            let ring = topology.face_node_ordinals(ordinal);
            let face_nodes = [
                corners[ring[0]],
                corners[ring[1]],
                corners[ring[2]],
                corners[ring[3]],
            ];
            let face = attach_face(&mut bulk, &mut faces, &mut edges, face_nodes)?;
            bulk.declare_relation(element, face, ordinal as u32)?;

            if let Some(side) = boundary_side(ordinal, i, j, k, nx, ny, nz) {
                bulk.change_entity_parts(face, &[surface_quads[side]], &[])?;
            }
        }
    }

    bulk.modification_end()?;

    // unit spacing from the origin
    let mut coords = bulk.field_mut::<f64>(coordinates)?;
    for (k, j, i) in iproduct!(0..=nz, 0..=ny, 0..=nx) {
        let values = coords.entity_values_mut(node_at(i, j, k))?;
        values[0] = i as f64;
        values[1] = j as f64;
        values[2] = k as f64;
    }

    debug!(
        "generated {nx}x{ny}x{nz} box: {} nodes, {} edges, {} faces, {} elements",
        bulk.num_entities(EntityRank::Node),
        bulk.num_entities(EntityRank::Edge),
        bulk.num_entities(EntityRank::Face),
        bulk.num_entities(EntityRank::Element),
    );

    Ok((
        bulk,
        BoxMeshHandles {
            block,
            surfaces,
            coordinates,
        },
    ))
}

/// The sideset index for an element face on the domain boundary, `None` for
/// interior faces. Indices follow the Exodus Hex8 face ordinals: y-min,
/// x-max, y-max, x-min, z-min, z-max.
fn boundary_side(
    face_ordinal: usize,
    i: usize,
    j: usize,
    k: usize,
    nx: usize,
    ny: usize,
    nz: usize,
) -> Option<usize> {
    let on_boundary = match face_ordinal {
        0 => j == 0,
        1 => i == nx - 1,
        2 => j == ny - 1,
        3 => i == 0,
        4 => k == 0,
        5 => k == nz - 1,
        _ => false,
    };
    on_boundary.then_some(face_ordinal)
}

fn sorted_ids<const N: usize>(
    bulk: &BulkData<NoComm>,
    nodes: [Entity; N],
) -> Result<[u64; N], MeshBulkError> {
    let mut ids = [0u64; N];
    for (slot, node) in nodes.into_iter().enumerate() {
        ids[slot] = bulk.identifier(node)?.get();
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Get or create the edge spanning two nodes; node relations are declared on
/// first creation only.
fn attach_edge(
    bulk: &mut BulkData<NoComm>,
    edges: &mut HashMap<[u64; 2], Entity>,
    nodes: [Entity; 2],
) -> Result<Entity, MeshBulkError> {
    let key = sorted_ids(bulk, nodes)?;
    if let Some(&edge) = edges.get(&key) {
        return Ok(edge);
    }
    let edge = bulk.declare_entity(EntityRank::Edge)?;
    for (ordinal, node) in nodes.into_iter().enumerate() {
        bulk.declare_relation(edge, node, ordinal as u32)?;
    }
    edges.insert(key, edge);
    Ok(edge)
}

/// Get or create the face over four nodes; node and edge relations are
/// declared on first creation only.
fn attach_face(
    bulk: &mut BulkData<NoComm>,
    faces: &mut HashMap<[u64; 4], Entity>,
    edges: &mut HashMap<[u64; 2], Entity>,
    nodes: [Entity; 4],
) -> Result<Entity, MeshBulkError> {
    let key = sorted_ids(bulk, nodes)?;
    if let Some(&face) = faces.get(&key) {
        return Ok(face);
    }
    let face = bulk.declare_entity(EntityRank::Face)?;
    for (ordinal, node) in nodes.into_iter().enumerate() {
        bulk.declare_relation(face, node, ordinal as u32)?;
    }
    let quad = CellTopology::Quad4;
    for ordinal in 0..quad.num_edges() {
        let pair = quad.edge_node_ordinals(ordinal);
        let edge = attach_edge(bulk, edges, [nodes[pair[0]], nodes[pair[1]]])?;
        bulk.declare_relation(face, edge, ordinal as u32)?;
    }
    faces.insert(key, face);
    Ok(face)
}
