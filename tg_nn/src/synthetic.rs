//! Synthetic 8x8 digit glyphs.
//!
//! Each example is a 5x7 bitmap digit placed at a random offset inside an 8x8
//! grid, with lit pixels in `[0.7, 1.0]` and background pixels in
//! `[0, noise)`. Features are left unnormalized.

use rand::Rng;

use crate::data::Dataset;
use crate::error::{Error, Result};

pub const GRID: usize = 8;
pub const NUM_FEATURES: usize = GRID * GRID;
pub const NUM_CLASSES: usize = 10;

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;

/// Rows of each digit, most significant of the low five bits leftmost.
const GLYPHS: [[u8; GLYPH_HEIGHT]; NUM_CLASSES] = [
    [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
    [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
    [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
    [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
    [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
    [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
];

fn lit(digit: usize, row: usize, col: usize) -> bool {
    GLYPHS[digit][row] & (1 << (GLYPH_WIDTH - 1 - col)) != 0
}

/// Render one noisy glyph of `digit` into 64 features.
pub fn render<R: Rng + ?Sized>(digit: usize, noise: f64, rng: &mut R) -> Result<Vec<f64>> {
    if digit >= NUM_CLASSES {
        return Err(Error::Dataset(format!(
            "no glyph for digit {digit}, expected 0..{NUM_CLASSES}"
        )));
    }
    let dx = rng.gen_range(0..=GRID - GLYPH_WIDTH);
    let dy = rng.gen_range(0..=GRID - GLYPH_HEIGHT);

    let mut pixels = vec![0.0; NUM_FEATURES];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        let (y, x) = (i / GRID, i % GRID);
        let on = (dy..dy + GLYPH_HEIGHT).contains(&y)
            && (dx..dx + GLYPH_WIDTH).contains(&x)
            && lit(digit, y - dy, x - dx);
        *pixel = if on {
            rng.gen_range(0.7..=1.0)
        } else if noise > 0.0 {
            rng.gen_range(0.0..noise)
        } else {
            0.0
        };
    }
    Ok(pixels)
}

/// Generate `samples` labelled glyphs with uniformly drawn classes.
///
/// `noise` must lie in `[0, 1)`.
pub fn digits<R: Rng + ?Sized>(samples: usize, noise: f64, rng: &mut R) -> Result<Dataset> {
    if !(0.0..1.0).contains(&noise) {
        return Err(Error::Dataset(format!("noise {noise} not in [0, 1)")));
    }
    let mut features = Vec::with_capacity(samples * NUM_FEATURES);
    let mut labels = Vec::with_capacity(samples);
    for _ in 0..samples {
        let digit = rng.gen_range(0..NUM_CLASSES);
        features.extend(render(digit, noise, rng)?);
        labels.push(digit);
    }
    Dataset::new(features, NUM_FEATURES, labels, NUM_CLASSES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_glyphs_are_distinct() {
        for a in 0..NUM_CLASSES {
            for b in a + 1..NUM_CLASSES {
                assert_ne!(GLYPHS[a], GLYPHS[b], "digits {a} and {b}");
            }
        }
    }

    #[test]
    fn test_render_without_noise() {
        let mut rng = StdRng::seed_from_u64(5);
        let pixels = render(1, 0.0, &mut rng).unwrap();
        assert_eq!(pixels.len(), NUM_FEATURES);

        let on = pixels.iter().filter(|&&p| p > 0.0).count();
        let expected: u32 = GLYPHS[1].iter().map(|r| r.count_ones()).sum();
        assert_eq!(on, expected as usize);
        assert!(pixels.iter().all(|&p| p == 0.0 || (0.7..=1.0).contains(&p)));
    }

    #[test]
    fn test_render_rejects_unknown_digit() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(render(9, 0.1, &mut rng).is_ok());
        assert!(matches!(render(10, 0.1, &mut rng), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_digits_seeded() {
        let a = digits(20, 0.2, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = digits(20, 0.2, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.len(), 20);
        assert_eq!(a.num_features(), 64);
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.row(7), b.row(7));
        assert!(a.labels().iter().all(|&l| l < NUM_CLASSES));
    }

    #[test]
    fn test_bad_noise_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(digits(4, 1.5, &mut rng).is_err());
        assert!(digits(0, 0.1, &mut rng).is_err());
    }
}
