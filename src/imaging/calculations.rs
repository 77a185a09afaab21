//! Pure calculation functions for image dimensions and crop placement.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::protocol::Position;

/// Resolve the requested box, deriving a missing side from the source aspect ratio.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `width` / `height` - Requested dimensions; `None` means "keep aspect"
///
/// # Returns
/// * `(width, height)` - Target box; the source size when neither side is given
pub fn resolve_target(source: (u32, u32), width: Option<u32>, height: Option<u32>) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        (None, None) => source,
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target` - Target area dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Fill dimensions (at least one matches target)
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Calculate the largest dimensions that fit inside a target area.
///
/// The mirror of [`calculate_fill_dimensions`]: one dimension matches the
/// target exactly, the other is at most the target.
pub fn calculate_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: width will match, height shrinks
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.clamp(1, tgt_h))
    } else {
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.clamp(1, tgt_w), h)
    }
}

/// Offset of an inner rectangle given the free space around it and a gravity.
///
/// `free` is `outer - inner` on each axis. For a crop it is the overflow of
/// the resampled image; for an embed it is the letterbox margin. `Entropy`
/// has no geometric meaning here and falls back to centre.
pub fn gravity_offset(free: (u32, u32), position: Position) -> (u32, u32) {
    let (free_x, free_y) = free;
    let centre_x = free_x / 2;
    let centre_y = free_y / 2;

    match position {
        Position::Centre | Position::Entropy => (centre_x, centre_y),
        Position::North => (centre_x, 0),
        Position::NorthEast => (free_x, 0),
        Position::East => (free_x, centre_y),
        Position::SouthEast => (free_x, free_y),
        Position::South => (centre_x, free_y),
        Position::SouthWest => (0, free_y),
        Position::West => (0, centre_y),
        Position::NorthWest => (0, 0),
    }
}

/// Offsets along one axis to try when searching for the busiest window.
///
/// At most 17 evenly spaced candidates; both ends are always included.
pub fn entropy_candidates(free: u32) -> Vec<u32> {
    let step = (free / 16).max(1);
    let mut offsets: Vec<u32> = (0..=free).step_by(step as usize).collect();
    if offsets.last() != Some(&free) {
        offsets.push(free);
    }
    offsets
}

/// Shannon entropy (bits) of an 8-bit luminance histogram.
pub fn shannon_entropy(histogram: &[u64; 256]) -> f64 {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}
