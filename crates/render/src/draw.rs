//! Pixel drawing primitives on an RGBA canvas.
//!
//! Everything clips to the canvas, so callers may pass coordinates that
//! fall partly outside it.

use deck_core::Rgb;
use image::{Rgba, RgbaImage};

pub fn rgba(color: Rgb) -> Rgba<u8> {
    Rgba([color.0, color.1, color.2, 255])
}

/// Set one pixel if it lies on the canvas.
fn plot(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

pub fn fill_rect(img: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, color: Rgba<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(img.width() as i64);
    let y1 = (y + h).min(img.height() as i64);
    for py in y0..y1 {
        for px in x0..x1 {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
}

pub fn stroke_rect(
    img: &mut RgbaImage,
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    thickness: i64,
    color: Rgba<u8>,
) {
    fill_rect(img, x, y, w, thickness, color);
    fill_rect(img, x, y + h - thickness, w, thickness, color);
    fill_rect(img, x, y, thickness, h, color);
    fill_rect(img, x + w - thickness, y, thickness, h, color);
}

/// Bresenham line with a square pen of `thickness` pixels.
///
/// With `dash > 0` the line alternates `dash` pixels on and off.
pub fn draw_line(
    img: &mut RgbaImage,
    (x0, y0): (i64, i64),
    (x1, y1): (i64, i64),
    thickness: i64,
    dash: i64,
    color: Rgba<u8>,
) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let half = thickness / 2;

    let (mut x, mut y) = (x0, y0);
    let mut err = dx + dy;
    let mut step = 0i64;
    loop {
        if dash == 0 || (step / dash) % 2 == 0 {
            fill_rect(img, x - half, y - half, thickness.max(1), thickness.max(1), color);
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
        step += 1;
    }
}

/// Line ending in a filled arrow head at `to`.
pub fn draw_arrow(
    img: &mut RgbaImage,
    from: (i64, i64),
    to: (i64, i64),
    thickness: i64,
    dashed: bool,
    color: Rgba<u8>,
) {
    draw_line(img, from, to, thickness, if dashed { 6 } else { 0 }, color);

    let (fx, fy) = (from.0 as f64, from.1 as f64);
    let (tx, ty) = (to.0 as f64, to.1 as f64);
    let len = ((tx - fx).powi(2) + (ty - fy).powi(2)).sqrt();
    if len < 1.0 {
        return;
    }
    let (ux, uy) = ((tx - fx) / len, (ty - fy) / len);
    let head = 12.0;
    let base = (tx - ux * head, ty - uy * head);
    let left = (base.0 - uy * head * 0.5, base.1 + ux * head * 0.5);
    let right = (base.0 + uy * head * 0.5, base.1 - ux * head * 0.5);
    fill_triangle(img, (tx, ty), left, right, color);
}

/// Fill a triangle by testing pixel centers against its edges.
pub fn fill_triangle(
    img: &mut RgbaImage,
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
    color: Rgba<u8>,
) {
    let edge = |p: (f64, f64), q: (f64, f64), r: (f64, f64)| {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    };
    let area = edge(a, b, c);
    if area.abs() < f64::EPSILON {
        return;
    }
    let min_x = a.0.min(b.0).min(c.0).floor() as i64;
    let max_x = a.0.max(b.0).max(c.0).ceil() as i64;
    let min_y = a.1.min(b.1).min(c.1).floor() as i64;
    let max_y = a.1.max(b.1).max(c.1).ceil() as i64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = (x as f64 + 0.5, y as f64 + 0.5);
            let w0 = edge(b, c, p) / area;
            let w1 = edge(c, a, p) / area;
            let w2 = edge(a, b, p) / area;
            if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                plot(img, x, y, color);
            }
        }
    }
}

/// Fill the sector of a circle between two angles (radians, clockwise
/// from twelve o'clock).
pub fn fill_sector(
    img: &mut RgbaImage,
    (cx, cy): (i64, i64),
    radius: i64,
    start: f64,
    end: f64,
    color: Rgba<u8>,
) {
    let r2 = (radius * radius) as f64;
    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            let dx = (x - cx) as f64 + 0.5;
            let dy = (y - cy) as f64 + 0.5;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let mut angle = dx.atan2(-dy);
            if angle < 0.0 {
                angle += std::f64::consts::TAU;
            }
            if angle >= start && angle < end {
                plot(img, x, y, color);
            }
        }
    }
}
