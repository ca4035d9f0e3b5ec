// SPDX-License-Identifier: CEPL-1.0
//! Decoding of the on-disk model and texture into [`SceneAssets`].

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use texel_render::{MeshData, SceneAssets, TextureData, Vertex};
use tracing::info;

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Falls back to the built-in quad and checker for whichever path is absent.
pub fn load_scene(model: Option<&Path>, texture: Option<&Path>) -> Result<SceneAssets> {
    let demo = SceneAssets::demo();
    let mesh = match model {
        Some(path) => load_mesh(path)?,
        None => demo.mesh,
    };
    let texture = match texture {
        Some(path) => load_texture(path)?,
        None => demo.texture,
    };
    Ok(SceneAssets { mesh, texture })
}

pub fn load_mesh(path: &Path) -> Result<MeshData> {
    let file = File::open(path).with_context(|| format!("open model {}", path.display()))?;
    let mesh = mesh_from_obj(&mut BufReader::new(file))
        .with_context(|| format!("load model {}", path.display()))?;
    info!(
        "model {}: {} vertices, {} indices ({:?})",
        path.display(),
        mesh.vertices.len(),
        mesh.indices.len(),
        mesh.indices.width()
    );
    Ok(mesh)
}

/// Every object in the file is merged into one triangle list. Materials are
/// ignored; V is flipped to match Vulkan's top-left texture origin.
pub fn mesh_from_obj<R: BufRead>(reader: &mut R) -> Result<MeshData> {
    let (models, _materials) = tobj::load_obj_buf(
        reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Ok(Default::default()),
    )
    .context("tobj::load_obj_buf")?;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        let base = vertices.len() as u32;
        for i in 0..mesh.positions.len() / 3 {
            let position = [
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            ];
            let color = if mesh.vertex_color.len() >= 3 * (i + 1) {
                [
                    mesh.vertex_color[3 * i],
                    mesh.vertex_color[3 * i + 1],
                    mesh.vertex_color[3 * i + 2],
                ]
            } else {
                WHITE
            };
            let tex_coord = if mesh.texcoords.len() >= 2 * (i + 1) {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            };
            vertices.push(Vertex::new(position, color, tex_coord));
        }
        indices.extend(mesh.indices.iter().map(|&i| base + i));
    }
    Ok(MeshData::new(vertices, indices)?)
}

pub fn load_texture(path: &Path) -> Result<TextureData> {
    let bytes = fs::read(path).with_context(|| format!("read texture {}", path.display()))?;
    let texture =
        texture_from_bytes(&bytes).with_context(|| format!("decode texture {}", path.display()))?;
    info!("texture {}: {}x{}", path.display(), texture.width, texture.height);
    Ok(texture)
}

pub fn texture_from_bytes(bytes: &[u8]) -> Result<TextureData> {
    let rgba = image::load_from_memory(bytes)
        .context("image::load_from_memory")?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TextureData::new(width, height, rgba.into_raw())?)
}
