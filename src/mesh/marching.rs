//! Surface extraction by marching tetrahedra.
//!
//! Each voxel cube is split into six tetrahedra around its main diagonal;
//! every tetrahedron the zero level crosses emits one or two triangles.
//! Cubes with an unobserved corner are skipped.

use crate::backend::Dispatch;
use crate::core::types::{IVec3, Vec3};
use crate::math::Aabb;
use crate::streaming::HostCache;
use crate::voxel::block::split_voxel_coord;
use crate::voxel::{EntryPtr, Scene, Voxel, VoxelBlock, BLOCK_SIZE};

/// Cube corners: bit 0 = +x, bit 1 = +y, bit 2 = +z
const CORNERS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// Six tetrahedra sharing the 0-7 diagonal
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 3, 2, 7],
    [0, 2, 6, 7],
    [0, 6, 4, 7],
    [0, 4, 5, 7],
    [0, 5, 1, 7],
];

/// Triangle soup in world coordinates
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub triangles: Vec<[Vec3; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounding box of all vertices, `None` for an empty mesh
    pub fn bounds(&self) -> Option<Aabb> {
        let first = self.triangles.first()?[0];
        let mut aabb = Aabb::new(first, first);
        for v in self.triangles.iter().flatten() {
            aabb.expand(*v);
        }
        Some(aabb)
    }
}

/// Unit normal of a triangle by the right-hand rule
#[inline]
pub fn triangle_normal(t: &[Vec3; 3]) -> Vec3 {
    (t[1] - t[0]).cross(t[2] - t[0]).normalize_or_zero()
}

/// Voxel access across device blocks and the host archive
pub struct BlockSource<'a> {
    scene: &'a Scene,
    host: Option<&'a HostCache>,
}

impl<'a> BlockSource<'a> {
    pub fn new(scene: &'a Scene, host: Option<&'a HostCache>) -> Self {
        Self { scene, host }
    }

    /// Block content at an address wherever it currently lives
    pub fn block(&self, addr: IVec3) -> Option<&'a VoxelBlock> {
        let entry = self.scene.find_entry(addr)?;
        match self.scene.entry(entry).ptr {
            EntryPtr::Slot(slot) => Some(self.scene.block(slot)),
            EntryPtr::Archived => self.host?.load(entry),
            EntryPtr::Empty => None,
        }
    }

    /// Addresses of every block with content
    pub fn addresses(&self) -> Vec<IVec3> {
        self.scene
            .hash()
            .iter_live()
            .filter(|(id, e)| match e.ptr {
                EntryPtr::Slot(_) => true,
                EntryPtr::Archived => self.host.is_some_and(|h| h.contains(*id)),
                EntryPtr::Empty => false,
            })
            .map(|(_, e)| e.pos)
            .collect()
    }
}

/// Reader with a one-block cache over a [`BlockSource`]
struct CachedReader<'s, 'a> {
    source: &'s BlockSource<'a>,
    cached: Option<(IVec3, Option<&'a VoxelBlock>)>,
}

impl CachedReader<'_, '_> {
    fn read(&mut self, voxel: IVec3) -> Option<Voxel> {
        let (addr, idx) = split_voxel_coord(voxel);
        let block = match self.cached {
            Some((cached_addr, block)) if cached_addr == addr => block,
            _ => {
                let block = self.source.block(addr);
                self.cached = Some((addr, block));
                block
            }
        };
        block.map(|b| b.voxels[idx])
    }
}

/// Emit the triangles of one tetrahedron
fn polygonize_tetrahedron(p: [Vec3; 4], s: [f32; 4], out: &mut Vec<[Vec3; 3]>) {
    let inside: Vec<usize> = (0..4).filter(|&i| s[i] < 0.0).collect();
    let outside: Vec<usize> = (0..4).filter(|&i| s[i] >= 0.0).collect();
    let cross = |a: usize, b: usize| {
        let t = s[a] / (s[a] - s[b]);
        p[a] + (p[b] - p[a]) * t
    };

    let mut emit = |tri: [Vec3; 3]| {
        // Face toward positive sdf
        let centroid = |ids: &[usize]| ids.iter().map(|&i| p[i]).sum::<Vec3>() / ids.len() as f32;
        let toward_outside = centroid(&outside) - centroid(&inside);
        let n = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
        if n.dot(toward_outside) < 0.0 {
            out.push([tri[0], tri[2], tri[1]]);
        } else {
            out.push(tri);
        }
    };

    match (inside.as_slice(), outside.as_slice()) {
        (&[a], &[b, c, d]) | (&[b, c, d], &[a]) => {
            emit([cross(a, b), cross(a, c), cross(a, d)]);
        }
        (&[a, b], &[c, d]) => {
            let (ac, ad, bd, bc) = (cross(a, c), cross(a, d), cross(b, d), cross(b, c));
            emit([ac, ad, bd]);
            emit([ac, bd, bc]);
        }
        _ => {}
    }
}

/// Triangles of the voxel cubes whose base corner lies in block `addr`
pub fn extract_block(source: &BlockSource<'_>, addr: IVec3, voxel_size: f32, out: &mut Vec<[Vec3; 3]>) {
    let mut reader = CachedReader { source, cached: None };
    let base = addr * BLOCK_SIZE;
    for z in 0..BLOCK_SIZE {
        for y in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                let origin = base + IVec3::new(x, y, z);
                let mut sdf = [0.0f32; 8];
                let mut complete = true;
                for (i, offset) in CORNERS.iter().enumerate() {
                    match reader.read(origin + *offset) {
                        Some(v) if v.is_observed() => sdf[i] = v.sdf(),
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    continue;
                }
                let all_in = sdf.iter().all(|&s| s < 0.0);
                let all_out = sdf.iter().all(|&s| s >= 0.0);
                if all_in || all_out {
                    continue;
                }
                for tet in &TETRAHEDRA {
                    let p = tet.map(|i| (origin + CORNERS[i]).as_vec3() * voxel_size);
                    let s = tet.map(|i| sdf[i]);
                    polygonize_tetrahedron(p, s, out);
                }
            }
        }
    }
}

/// Extract the zero level of every block on device or in the host archive
pub fn extract_mesh(dispatch: Dispatch, scene: &Scene, host: Option<&HostCache>) -> Mesh {
    let source = BlockSource::new(scene, host);
    let addresses = source.addresses();
    let voxel_size = scene.voxel_size();
    let per_block = dispatch.map(addresses.len(), |i| {
        let mut tris = Vec::new();
        extract_block(&source, addresses[i], voxel_size, &mut tris);
        tris
    });
    let mesh = Mesh {
        triangles: per_block.into_iter().flatten().collect(),
    };
    log::info!("Extracted {} triangles from {} blocks", mesh.triangle_count(), addresses.len());
    mesh
}
