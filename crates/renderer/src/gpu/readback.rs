use image::RgbaImage;

use crate::surface::SurfaceError;

use super::textures::SurfaceTexture;

const BYTES_PER_PIXEL: u32 = 4;

/// Copies `source` into a mappable buffer and returns it with row padding stripped.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &SurfaceTexture,
) -> Result<RgbaImage, SurfaceError> {
    let (width, height) = (source.width, source.height);
    let unpadded_row = width * BYTES_PER_PIXEL;
    let padded_row = unpadded_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded_row) * u64::from(height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        source.texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: None,
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| SurfaceError::Readback(err.to_string()))?;
    receiver
        .recv()
        .map_err(|err| SurfaceError::Readback(format!("map callback dropped: {err}")))?
        .map_err(|err| SurfaceError::Readback(err.to_string()))?;

    let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks_exact(padded_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_row as usize]);
        }
    }
    buffer.unmap();

    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        SurfaceError::Readback(format!("short readback for {width}x{height} target"))
    })
}
