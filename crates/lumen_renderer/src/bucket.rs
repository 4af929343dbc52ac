//! Bucket-based tile rendering.
//!
//! Divides the image into square buckets that are rendered independently
//! and in parallel using rayon. Every bucket draws from its own random
//! stream, so the image does not depend on how buckets are scheduled.

use lumen_core::{Color, IntersectionService, ShadingService};
use lumen_math::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::camera::{Camera, CameraSample};
use crate::path_tracer::PathTracer;

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// X coordinate of bucket's top-left corner
    pub x: usize,
    /// Y coordinate of bucket's top-left corner
    pub y: usize,
    pub width: usize,
    pub height: usize,
    /// Position in render order; also selects the bucket's random stream
    pub index: usize,
}

impl Bucket {
    pub fn new(x: usize, y: usize, width: usize, height: usize, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            index,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Generate buckets for an image, sorted in spiral order from center.
///
/// Buckets closer to the center come first so the most important part of
/// the frame finishes early.
pub fn generate_buckets(width: usize, height: usize, bucket_size: usize) -> Vec<Bucket> {
    let bucket_size = bucket_size.max(1);
    let mut buckets = Vec::new();

    for y in (0..height).step_by(bucket_size) {
        for x in (0..width).step_by(bucket_size) {
            let bw = bucket_size.min(width - x);
            let bh = bucket_size.min(height - y);
            buckets.push(Bucket::new(x, y, bw, bh, buckets.len()));
        }
    }

    sort_spiral(&mut buckets, width, height);

    for (i, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = i;
    }

    buckets
}

/// Sort buckets by distance from the image center. Stable, so ties keep
/// scanline order.
fn sort_spiral(buckets: &mut [Bucket], width: usize, height: usize) {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;

    let distance = |b: &Bucket| {
        let cx = b.x as f32 + b.width as f32 / 2.0;
        let cy = b.y as f32 + b.height as f32 / 2.0;
        (cx - center_x).powi(2) + (cy - center_y).powi(2)
    };

    buckets.sort_by(|a, b| {
        distance(a)
            .partial_cmp(&distance(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Seed for a bucket's random stream (splitmix64 finalizer over seed and index).
pub fn bucket_seed(seed: u64, index: usize) -> u64 {
    let mut z = seed ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Result of rendering a bucket.
#[derive(Debug, Clone)]
pub struct BucketResult {
    pub bucket: Bucket,
    /// Gamma-encoded pixels in row-major order
    pub pixels: Vec<Color>,
    /// Samples dropped for having a non-finite component
    pub discarded: usize,
}

/// Per-bucket sampling settings.
#[derive(Debug, Clone, Copy)]
pub struct BucketSettings {
    pub samples_per_pixel: u32,
    pub gamma: f32,
    pub seed: u64,
}

/// Render one bucket with the worker's shading context.
pub fn render_bucket<A, S, C>(
    bucket: &Bucket,
    tracer: &PathTracer<'_, A, S>,
    camera: &C,
    ctx: &mut S::Context,
    settings: &BucketSettings,
) -> BucketResult
where
    A: IntersectionService,
    S: ShadingService,
    C: Camera,
{
    let mut rng = StdRng::seed_from_u64(bucket_seed(settings.seed, bucket.index));
    let spp = settings.samples_per_pixel.max(1);
    let inv_gamma = 1.0 / settings.gamma;
    let mut pixels = Vec::with_capacity(bucket.pixel_count());
    let mut discarded = 0;

    for local_y in 0..bucket.height {
        for local_x in 0..bucket.width {
            let x = (bucket.x + local_x) as f32;
            let y = (bucket.y + local_y) as f32;
            let mut sum = Color::ZERO;

            for _ in 0..spp {
                let sample = CameraSample {
                    image: Vec2::new(x + rng.gen::<f32>(), y + rng.gen::<f32>()),
                    lens: Vec2::new(rng.gen(), rng.gen()),
                };
                let ray = camera.generate_ray(&sample);
                let li = tracer.li(ctx, &mut rng, ray);
                if li.is_finite() {
                    sum += li;
                } else {
                    discarded += 1;
                }
            }

            let mean = sum / spp as f32;
            pixels.push(mean.max(Color::ZERO).powf(inv_gamma));
        }
    }

    BucketResult {
        bucket: *bucket,
        pixels,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_buckets_exact_fit() {
        let buckets = generate_buckets(128, 128, 64);
        assert_eq!(buckets.len(), 4);

        let total_pixels: usize = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 128 * 128);
    }

    #[test]
    fn test_generate_buckets_partial_fit() {
        let buckets = generate_buckets(100, 70, 64);
        assert_eq!(buckets.len(), 4);

        let total_pixels: usize = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 100 * 70);
        assert!(buckets.iter().all(|b| b.x + b.width <= 100 && b.y + b.height <= 70));
    }

    #[test]
    fn test_spiral_order() {
        let buckets = generate_buckets(192, 192, 64);
        assert_eq!(buckets.len(), 9);

        let first = &buckets[0];
        assert_eq!((first.x, first.y), (64, 64));
        assert!(buckets.iter().enumerate().all(|(i, b)| b.index == i));
    }

    #[test]
    fn test_bucket_seeds_are_distinct_and_stable() {
        let seeds: Vec<u64> = (0..64).map(|i| bucket_seed(42, i)).collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seeds.len());
        assert_eq!(bucket_seed(42, 3), seeds[3]);
        assert_ne!(bucket_seed(43, 3), seeds[3]);
    }
}
