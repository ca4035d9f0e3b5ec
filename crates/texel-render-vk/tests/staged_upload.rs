// SPDX-License-Identifier: CEPL-1.0
//! Device round trips. Need a Vulkan driver, so ignored by default:
//! `cargo test -p texel-render-vk -- --ignored`

use texel_render::{AssetError, MeshData, TextureData};
use texel_render_vk::commands::Geometry;
use texel_render_vk::upload::{
    create_device_local_buffer, download_from_device, upload_to_device,
};
use texel_render_vk::{
    Buffer, BufferKind, CommandPool, DeviceConfig, DeviceContext, RenderError, Texture,
};

fn headless() -> (DeviceContext, CommandPool) {
    texel_core::init_tracing();
    let ctx = DeviceContext::headless(&DeviceConfig::headless()).expect("headless device");
    let pool =
        unsafe { CommandPool::new(&ctx.device, ctx.families.graphics) }.expect("command pool");
    (ctx, pool)
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn staged_upload_round_trips_exactly() {
    let (ctx, pool) = headless();
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4096 + 7).collect();

    let buffer = unsafe { create_device_local_buffer(&ctx, &pool, BufferKind::Vertex, &bytes) }
        .expect("upload");
    let back = unsafe { download_from_device(&ctx, &pool, &buffer) }.expect("download");
    assert_eq!(back, bytes);
    drop(buffer);
    drop(pool);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn partial_upload_leaves_the_tail_alone() {
    let (ctx, pool) = headless();
    let buffer = unsafe { create_device_local_buffer(&ctx, &pool, BufferKind::Index, &[0xAA; 64]) }
        .expect("upload");
    unsafe { upload_to_device(&ctx, &pool, &buffer, &[0x11; 16]) }.expect("second upload");

    let back = unsafe { download_from_device(&ctx, &pool, &buffer) }.expect("download");
    assert_eq!(&back[..16], &[0x11; 16]);
    assert_eq!(&back[16..], &[0xAA; 48]);
    drop(buffer);
    drop(pool);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn oversized_upload_is_rejected() {
    let (ctx, pool) = headless();
    let buffer = unsafe { Buffer::new(&ctx, 8, BufferKind::Vertex) }.expect("buffer");
    let err = unsafe { upload_to_device(&ctx, &pool, &buffer, &[0; 16]) };
    assert!(err.is_err());
    drop(buffer);
    drop(pool);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn quad_geometry_uploads_with_16_bit_indices() {
    let (ctx, pool) = headless();
    let geometry = unsafe { Geometry::upload(&ctx, &pool, &MeshData::quad()) }.expect("geometry");
    assert_eq!(geometry.index_count, 6);
    assert_eq!(geometry.vertices.size, 4 * 32);
    assert_eq!(geometry.indices.size, 6 * 2);

    let indices =
        unsafe { download_from_device(&ctx, &pool, &geometry.indices) }.expect("download");
    let indices: Vec<u16> = indices
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);
    drop(geometry);
    drop(pool);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn solid_texture_uploads() {
    let (ctx, pool) = headless();
    let data = TextureData::solid(64, 64, [200, 100, 50, 255]);
    let texture = unsafe { Texture::upload(&ctx, &pool, &data) }.expect("texture");
    assert_eq!((texture.width, texture.height), (64, 64));
    drop(texture);
    drop(pool);
}

#[test]
#[ignore = "needs a Vulkan driver"]
fn malformed_texture_is_a_typed_error() {
    let (ctx, pool) = headless();
    let data = TextureData {
        width: 64,
        height: 64,
        pixels: vec![0; 10],
    };
    let err = unsafe { Texture::upload(&ctx, &pool, &data) }
        .err()
        .expect("upload must fail");
    assert!(matches!(
        err.downcast_ref::<RenderError>(),
        Some(RenderError::InvalidTexture(AssetError::TextureSize { .. }))
    ));
    drop(pool);
}
