// SPDX-License-Identifier: GPL-3.0-only

//! Frame-pair motion detection
//!
//! ```text
//! |curr - prev| -> luma -> gaussian blur -> threshold -> dilate
//!     -> 8-connected regions -> bounding boxes >= min_area
//! ```
//!
//! The detector holds no state between calls. The last-motion timestamp and
//! idle timeout belong to the capture loop.

use crate::backends::camera::Frame;
use crate::constants::motion;
use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use tracing::debug;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MOVING_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const IDLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BANNER_WIDTH: u32 = 96;
const BANNER_HEIGHT: u32 = 16;

/// Bounding box of one changed region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn area(&self) -> u32 {
        self.width * self.height
    }
}

/// Outcome of comparing two frames
#[derive(Debug, Clone)]
pub struct MotionResult {
    pub moved: bool,
    /// Copy of the current frame with boxes and status banner, for preview only
    pub annotated: RgbImage,
    /// Regions at least `min_area` large
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone)]
pub struct MotionDetector {
    min_area: u32,
    blur_sigma: f32,
    threshold: u8,
    dilate_iterations: u32,
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(motion::MIN_AREA)
    }
}

impl MotionDetector {
    pub fn new(min_area: u32) -> Self {
        Self {
            min_area,
            blur_sigma: motion::BLUR_SIGMA,
            threshold: motion::DIFF_THRESHOLD,
            dilate_iterations: motion::DILATE_ITERATIONS,
        }
    }

    pub fn min_area(&self) -> u32 {
        self.min_area
    }

    /// Compare `curr` against `prev`
    pub fn detect(&self, prev: &Frame, curr: &Frame) -> MotionResult {
        if prev.image.dimensions() != curr.image.dimensions() {
            debug!(
                prev = ?prev.image.dimensions(),
                curr = ?curr.image.dimensions(),
                "Frame size changed, skipping motion detection"
            );
            return MotionResult {
                moved: false,
                annotated: curr.image.clone(),
                regions: Vec::new(),
            };
        }

        let diff = abs_diff(&prev.image, &curr.image);
        let luma = imageops::grayscale(&diff);
        let blurred = imageops::blur(&luma, self.blur_sigma);
        let mut mask = threshold(&blurred, self.threshold);
        for _ in 0..self.dilate_iterations {
            mask = dilate(&mask);
        }

        let regions: Vec<Region> = connected_regions(&mask)
            .into_iter()
            .filter(|r| r.area() >= self.min_area)
            .collect();
        let moved = !regions.is_empty();

        let mut annotated = curr.image.clone();
        for region in &regions {
            draw_box(&mut annotated, region, BOX_COLOR);
        }
        draw_banner(&mut annotated, if moved { MOVING_COLOR } else { IDLE_COLOR });

        MotionResult {
            moved,
            annotated,
            regions,
        }
    }
}

fn abs_diff(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(a.width(), a.height());
    for ((dst, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        *dst = Rgb([
            pa[0].abs_diff(pb[0]),
            pa[1].abs_diff(pb[1]),
            pa[2].abs_diff(pb[2]),
        ]);
    }
    out
}

fn threshold(image: &GrayImage, level: u8) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > level { 255 } else { 0 };
    }
    out
}

/// One 3x3 dilation pass
fn dilate(mask: &GrayImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            if mask.get_pixel(x, y)[0] == 0 {
                continue;
            }
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    out.put_pixel(nx, ny, Luma([255]));
                }
            }
        }
    }
    out
}

/// Bounding boxes of 8-connected foreground regions
fn connected_regions(mask: &GrayImage) -> Vec<Region> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w as usize) * (h as usize)];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || mask.get_pixel(x, y)[0] == 0 {
                continue;
            }

            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
            visited[idx] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);

                for ny in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
                    for nx in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
                        let nidx = (ny * w + nx) as usize;
                        if !visited[nidx] && mask.get_pixel(nx, ny)[0] != 0 {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            regions.push(Region {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            });
        }
    }

    regions
}

fn draw_box(image: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let x1 = (region.x + region.width - 1).min(w - 1);
    let y1 = (region.y + region.height - 1).min(h - 1);

    for x in region.x..=x1 {
        image.put_pixel(x, region.y, color);
        image.put_pixel(x, y1, color);
    }
    for y in region.y..=y1 {
        image.put_pixel(region.x, y, color);
        image.put_pixel(x1, y, color);
    }
}

fn draw_banner(image: &mut RgbImage, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    for y in 0..BANNER_HEIGHT.min(h) {
        for x in 0..BANNER_WIDTH.min(w) {
            image.put_pixel(x, y, color);
        }
    }
}
