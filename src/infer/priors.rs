//! Anchor priors for the four-level detection pyramid.
//!
//! Each prior is a reference box in normalized image coordinates. Row `i` of
//! every network output tensor is a regression against `priors[i]`, so the
//! order produced here (level, then row-major cell, then min size) is fixed.

/// Anchor sizes in pixels per pyramid level.
pub const MIN_SIZES: [&[f32]; 4] = [
    &[10.0, 16.0, 24.0],
    &[32.0, 48.0],
    &[64.0, 96.0],
    &[128.0, 192.0, 256.0],
];

/// Input pixels covered by one feature-map cell, per level.
pub const STEPS: [u32; 4] = [8, 16, 32, 64];

/// Reference box: center `(cx, cy)` and extents `(sx, sy)`, all normalized by image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub cx: f32,
    pub cy: f32,
    pub sx: f32,
    pub sy: f32,
}

/// Grid sizes `(cols, rows)` of the four kept pyramid levels.
///
/// The network halves its input five times; the first halving rounds up, the
/// rest floor. The first two stages carry no detection head.
pub fn feature_map_sizes(width: u32, height: u32) -> [(u32, u32); 4] {
    let mut size = (width.div_ceil(2), height.div_ceil(2));
    size = (size.0 / 2, size.1 / 2);
    let mut out = [(0u32, 0u32); 4];
    for level in out.iter_mut() {
        size = (size.0 / 2, size.1 / 2);
        *level = size;
    }
    out
}

/// Number of priors for an input size, without generating them.
pub fn prior_count(width: u32, height: u32) -> usize {
    feature_map_sizes(width, height)
        .iter()
        .zip(MIN_SIZES)
        .map(|(&(cols, rows), sizes)| cols as usize * rows as usize * sizes.len())
        .sum()
}

pub fn generate_priors(width: u32, height: u32) -> Vec<Prior> {
    let (w, h) = (width as f32, height as f32);
    let mut priors = Vec::with_capacity(prior_count(width, height));
    for (level, (cols, rows)) in feature_map_sizes(width, height).into_iter().enumerate() {
        let step = STEPS[level] as f32;
        for row in 0..rows {
            for col in 0..cols {
                let cx = (col as f32 + 0.5) * step / w;
                let cy = (row as f32 + 0.5) * step / h;
                for &m in MIN_SIZES[level] {
                    priors.push(Prior { cx, cy, sx: m / w, sy: m / h });
                }
            }
        }
    }
    priors
}
