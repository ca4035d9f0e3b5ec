// SPDX-License-Identifier: CEPL-1.0
use crate::AssetError;

/// One mesh vertex. The pipeline's vertex-input description mirrors this
/// layout field for field: binding 0, locations 0..=2, stride 32.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    pub const POSITION_OFFSET: u32 = std::mem::offset_of!(Vertex, position) as u32;
    pub const COLOR_OFFSET: u32 = std::mem::offset_of!(Vertex, color) as u32;
    pub const TEX_COORD_OFFSET: u32 = std::mem::offset_of!(Vertex, tex_coord) as u32;
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

/// Index stream, stored at the narrowest width the mesh allows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    /// Narrows to 16-bit indices when every vertex is addressable with them.
    /// Callers must have checked every index against `vertex_count`.
    fn for_vertex_count(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count <= usize::from(u16::MAX) + 1 {
            IndexData::U16(indices.into_iter().map(|i| i as u16).collect())
        } else {
            IndexData::U32(indices)
        }
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            IndexData::U16(_) => IndexWidth::U16,
            IndexData::U32(_) => IndexWidth::U32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            IndexData::U16(v) => Box::new(v.iter().map(|&i| u32::from(i))),
            IndexData::U32(v) => Box::new(v.iter().copied()),
        }
    }
}

/// A static indexed triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: IndexData,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self, AssetError> {
        if vertices.is_empty() {
            return Err(AssetError::EmptyMesh);
        }
        if indices.is_empty() {
            return Err(AssetError::NoIndices);
        }
        if indices.len() % 3 != 0 {
            return Err(AssetError::NotTriangles(indices.len()));
        }
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|(_, &i)| i as usize >= vertices.len())
        {
            return Err(AssetError::IndexOutOfRange {
                index,
                position,
                vertex_count: vertices.len(),
            });
        }
        let indices = IndexData::for_vertex_count(indices, vertices.len());
        Ok(Self { vertices, indices })
    }

    /// Unit quad in the z = 0 plane, one colour per corner.
    pub fn quad() -> Self {
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0]),
        ];
        Self {
            vertices,
            indices: IndexData::U16(vec![0, 1, 2, 2, 3, 0]),
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}
