//! 64-bit DCT perceptual hash

use crate::types::PerceptualHasher;
use image::imageops::FilterType;
use image::DynamicImage;
use std::f64::consts::PI;

const SAMPLE: usize = 32;
const LOW: usize = 8;

/// Number of differing bits between two hashes
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// DCT perceptual hasher
///
/// Grayscale, 32×32 resample, 2-D DCT-II, keep the top-left 8×8 block and
/// set one bit per coefficient above the block median.
#[derive(Debug, Default, Clone, Copy)]
pub struct DctHasher;

impl PerceptualHasher for DctHasher {
    fn hash(&self, image: &[u8]) -> Option<u64> {
        let decoded = image::load_from_memory(image).ok()?;
        Some(phash_of(&decoded))
    }
}

/// Hash an already decoded image
pub fn phash_of(image: &DynamicImage) -> u64 {
    let gray = image
        .resize_exact(SAMPLE as u32, SAMPLE as u32, FilterType::Triangle)
        .to_luma8();
    let pixels: Vec<f64> = gray.pixels().map(|p| f64::from(p.0[0])).collect();

    let coefficients = dct_2d(&pixels);

    let mut low = [0.0f64; LOW * LOW];
    for y in 0..LOW {
        for x in 0..LOW {
            low[y * LOW + x] = coefficients[y * SAMPLE + x];
        }
    }

    let median = median(&low);
    low.iter()
        .enumerate()
        .filter(|(_, &c)| c > median)
        .fold(0u64, |hash, (bit, _)| hash | (1u64 << bit))
}

fn cosine_table() -> Vec<f64> {
    let mut table = vec![0.0; SAMPLE * SAMPLE];
    for k in 0..SAMPLE {
        for n in 0..SAMPLE {
            table[k * SAMPLE + n] = (PI / SAMPLE as f64 * (n as f64 + 0.5) * k as f64).cos();
        }
    }
    table
}

/// Separable unnormalized DCT-II over a SAMPLE×SAMPLE row-major block
fn dct_2d(pixels: &[f64]) -> Vec<f64> {
    let table = cosine_table();

    // rows
    let mut rows = vec![0.0; SAMPLE * SAMPLE];
    for y in 0..SAMPLE {
        for k in 0..SAMPLE {
            rows[y * SAMPLE + k] = (0..SAMPLE)
                .map(|n| pixels[y * SAMPLE + n] * table[k * SAMPLE + n])
                .sum();
        }
    }

    // columns
    let mut out = vec![0.0; SAMPLE * SAMPLE];
    for x in 0..SAMPLE {
        for k in 0..SAMPLE {
            out[k * SAMPLE + x] = (0..SAMPLE)
                .map(|n| rows[n * SAMPLE + x] * table[k * SAMPLE + n])
                .sum();
        }
    }
    out
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
