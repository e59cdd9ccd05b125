//! Binary mask operations for colour tracking
//!
//! HSV uses the 8-bit convention of common vision libraries: H in 0..=179
//! (degrees / 2), S and V in 0..=255. Masks are `GrayImage`s holding 0 or 255.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Mask value for "set"
pub const ON: u8 = 255;

/// Side of the square structuring element used by open/close
pub const KERNEL_SIZE: u32 = 5;

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(px: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = px.0.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let h_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };

    [
        ((h_deg / 2.0).round() as u16 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// Set every pixel whose HSV value lies inside `[lower, upper]` (inclusive).
pub fn in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, px) in image.enumerate_pixels() {
        let hsv = rgb_to_hsv(*px);
        let inside = (0..3).all(|c| hsv[c] >= lower[c] && hsv[c] <= upper[c]);
        if inside {
            mask.put_pixel(x, y, Luma([ON]));
        }
    }
    mask
}

/// Erode with a `KERNEL_SIZE` square. Pixels outside the image do not erode.
pub fn erode(mask: &GrayImage) -> GrayImage {
    let horizontal = sweep(mask, Axis::X, u8::min);
    sweep(&horizontal, Axis::Y, u8::min)
}

/// Dilate with a `KERNEL_SIZE` square.
pub fn dilate(mask: &GrayImage) -> GrayImage {
    let horizontal = sweep(mask, Axis::X, u8::max);
    sweep(&horizontal, Axis::Y, u8::max)
}

/// Erode then dilate (removes specks)
pub fn open(mask: &GrayImage) -> GrayImage {
    dilate(&erode(mask))
}

/// Dilate then erode (fills pinholes)
pub fn close(mask: &GrayImage) -> GrayImage {
    erode(&dilate(mask))
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Separable 1-D pass of a square min/max filter
fn sweep(mask: &GrayImage, axis: Axis, combine: fn(u8, u8) -> u8) -> GrayImage {
    let (w, h) = mask.dimensions();
    let radius = (KERNEL_SIZE / 2) as i64;
    let mut out = GrayImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut acc: Option<u8> = None;
            for d in -radius..=radius {
                let (nx, ny) = match axis {
                    Axis::X => (x as i64 + d, y as i64),
                    Axis::Y => (x as i64, y as i64 + d),
                };
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let v = mask.get_pixel(nx as u32, ny as u32).0[0];
                acc = Some(acc.map_or(v, |a| combine(a, v)));
            }
            out.put_pixel(x, y, Luma([acc.unwrap_or(0)]));
        }
    }
    out
}

/// One 8-connected region of set pixels, measured inside its outer boundary.
///
/// Holes enclosed by the region count towards `area` and the moments, so a
/// ring measures the same as the disc it outlines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    /// Pixels inside the outer boundary, holes included
    pub area: u32,
    /// Set pixels belonging to the region
    pub pixels: u32,
    /// First-order moment about x (sum of x)
    pub m10: f64,
    /// First-order moment about y (sum of y)
    pub m01: f64,
}

impl Blob {
    /// Centroid (m10/m00, m01/m00)
    pub fn centroid(&self) -> (f32, f32) {
        let m00 = f64::from(self.area.max(1));
        ((self.m10 / m00) as f32, (self.m01 / m00) as f32)
    }
}

/// Largest 8-connected region by filled area.
///
/// Ties keep the region found first in row-major order.
pub fn largest_blob(mask: &GrayImage) -> Option<Blob> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut stack: Vec<(u32, u32)> = Vec::new();
    let mut region: Vec<(u32, u32)> = Vec::new();
    let mut best: Option<Blob> = None;

    let idx = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;

    for y in 0..h {
        for x in 0..w {
            if visited[idx(x, y)] || mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }

            region.clear();
            visited[idx(x, y)] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                region.push((cx, cy));

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = cx as i64 + dx;
                        let ny = cy as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        if !visited[idx(nx, ny)] && mask.get_pixel(nx, ny).0[0] != 0 {
                            visited[idx(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            let blob = fill_region(&region);
            if best.is_none_or(|b| blob.area > b.area) {
                best = Some(blob);
            }
        }
    }
    best
}

const UNKNOWN: u8 = 0;
const REGION: u8 = 1;
const OUTSIDE: u8 = 2;

/// Measure a region with its enclosed holes filled.
///
/// Works on the region's bounding box padded by one cell. The background is
/// flooded 4-connected from the padding; whatever it cannot reach lies inside
/// the outer boundary.
fn fill_region(region: &[(u32, u32)]) -> Blob {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    for &(x, y) in region {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let gw = (max_x - min_x + 3) as usize;
    let gh = (max_y - min_y + 3) as usize;
    let mut grid = vec![UNKNOWN; gw * gh];
    for &(x, y) in region {
        grid[(y - min_y + 1) as usize * gw + (x - min_x + 1) as usize] = REGION;
    }

    let mut stack = vec![(0usize, 0usize)];
    grid[0] = OUTSIDE;
    while let Some((gx, gy)) = stack.pop() {
        let neighbours = [
            (gx.wrapping_sub(1), gy),
            (gx + 1, gy),
            (gx, gy.wrapping_sub(1)),
            (gx, gy + 1),
        ];
        for (nx, ny) in neighbours {
            if nx < gw && ny < gh && grid[ny * gw + nx] == UNKNOWN {
                grid[ny * gw + nx] = OUTSIDE;
                stack.push((nx, ny));
            }
        }
    }

    let mut blob = Blob {
        area: 0,
        pixels: region.len() as u32,
        m10: 0.0,
        m01: 0.0,
    };
    for gy in 1..gh - 1 {
        for gx in 1..gw - 1 {
            if grid[gy * gw + gx] != OUTSIDE {
                blob.area += 1;
                blob.m10 += f64::from(min_x + gx as u32 - 1);
                blob.m01 += f64::from(min_y + gy as u32 - 1);
            }
        }
    }
    blob
}
