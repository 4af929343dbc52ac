//! Lumen renderer - CPU path tracing.
//!
//! A Monte Carlo path tracer over a committed [`Scene`]:
//! - two-level BVH intersection service
//! - perspective camera with ray differentials and thin-lens depth of field
//! - importance-sampled background and area lights combined with MIS
//! - parallel bucket rendering with deterministic per-bucket random streams

mod accel;
mod background;
mod bucket;
mod bvh;
mod camera;
mod config;
mod error;
mod image_buffer;
mod path_tracer;
mod shaders;

pub use accel::InstancedAccelerator;
pub use background::{BackgroundLight, Distribution1D, Distribution2D};
pub use bucket::{bucket_seed, generate_buckets, render_bucket, Bucket, BucketResult, BucketSettings};
pub use bvh::BvhNode;
pub use camera::{Camera, CameraSample, PerspectiveCamera, PerspectiveParams};
pub use config::RenderConfig;
pub use error::{CameraError, ConfigError, ImageError};
pub use image_buffer::ImageBuffer;
pub use path_tracer::{power_heuristic, PathTracer};
pub use shaders::{Background, Material, ReferenceBsdf, ReferenceShading, ShadingContext};

use std::time::Instant;

use log::{info, warn};
use lumen_core::{IntersectionService, Scene, ShaderRef, ShadingService};
use rayon::prelude::*;

/// Render the scene as seen by `camera`.
///
/// `background` names the shader for rays leaving the scene; with `None`
/// they carry no radiance. The background is tabulated for importance
/// sampling before any parallel work starts.
pub fn render<A, S, C>(
    scene: &Scene<A>,
    camera: &C,
    background: Option<&ShaderRef>,
    shading: &S,
    config: &RenderConfig,
) -> ImageBuffer
where
    A: IntersectionService,
    S: ShadingService,
    C: Camera,
{
    let start = Instant::now();
    let (width, height) = camera.resolution();
    let seed = config.resolve_seed();

    let background = background.map(|shader| {
        let mut ctx = shading.create_context();
        BackgroundLight::new(
            shading,
            &mut ctx,
            shader.clone(),
            config.background_resolution as usize,
        )
    });

    let tracer = PathTracer::new(scene, shading, camera, background.as_ref(), config.max_depth);
    let buckets = generate_buckets(width, height, config.bucket_size as usize);
    let settings = BucketSettings {
        samples_per_pixel: config.samples_per_pixel,
        gamma: config.gamma,
        seed,
    };

    info!(
        "Rendering {}x{} at {} spp in {} buckets (seed {})",
        width,
        height,
        config.samples_per_pixel,
        buckets.len(),
        seed
    );

    let results: Vec<BucketResult> = buckets
        .par_iter()
        .map_init(
            || shading.create_context(),
            |ctx, bucket| render_bucket(bucket, &tracer, camera, ctx, &settings),
        )
        .collect();

    let mut image = ImageBuffer::new(width, height);
    let mut discarded = 0;
    for result in &results {
        let b = &result.bucket;
        image.write_block(b.x, b.y, b.width, &result.pixels);
        discarded += result.discarded;
    }

    if discarded > 0 {
        warn!("Discarded {} non-finite samples", discarded);
    }
    info!("Render finished in {:.2?}", start.elapsed());
    image
}
