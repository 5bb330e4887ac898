use image::GrayImage;

use super::EDGE;

// tan(22.5deg) and tan(67.5deg) scaled by 1e4 for integer direction binning.
const TAN_22_5: i64 = 4_142;
const TAN_67_5: i64 = 24_142;

/// Two-threshold edge detector.
///
/// Steps:
/// 1. 3x3 Sobel gradients with replicated borders, L1 magnitude `|gx| + |gy|`
/// 2. Non-maximum suppression along the gradient direction (4 bins)
/// 3. Hysteresis: thinned magnitude `>= upper` is a strong edge, `> lower` is a weak
///    edge kept only when 8-connected to a strong one
///
/// `upper == 0` makes every pixel a strong edge. Callers pass `lower <= upper`.
pub fn detect_edges(gray: &GrayImage, lower: u8, upper: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    let (w, h) = (w as usize, h as usize);
    if w == 0 || h == 0 {
        return out;
    }

    let (gx, gy, magnitude) = sobel(gray.as_raw(), w, h);
    let thinned = suppress_non_maxima(&gx, &gy, &magnitude, w, h);

    let lower = i32::from(lower);
    let upper = i32::from(upper);
    let marks: &mut [u8] = &mut out;
    let mut stack: Vec<usize> = Vec::new();

    for (i, &m) in thinned.iter().enumerate() {
        if m >= upper {
            marks[i] = EDGE;
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if marks[n] == 0 && thinned[n] > lower {
                    marks[n] = EDGE;
                    stack.push(n);
                }
            }
        }
    }

    out
}

fn sobel(src: &[u8], w: usize, h: usize) -> (Vec<i32>, Vec<i32>, Vec<i32>) {
    let at = |x: isize, y: isize| -> i32 {
        let xc = x.clamp(0, w as isize - 1) as usize;
        let yc = y.clamp(0, h as isize - 1) as usize;
        i32::from(src[yc * w + xc])
    };

    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    let mut magnitude = vec![0i32; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            let dx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let dy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }
    (gx, gy, magnitude)
}

fn suppress_non_maxima(gx: &[i32], gy: &[i32], magnitude: &[i32], w: usize, h: usize) -> Vec<i32> {
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut thinned = vec![0i32; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let i = y as usize * w + x as usize;
            let m = magnitude[i];
            if m == 0 {
                continue;
            }
            let ax = i64::from(gx[i].abs());
            let ay = i64::from(gy[i].abs());
            let (a, b) = if ay * 10_000 < ax * TAN_22_5 {
                (mag_at(x - 1, y), mag_at(x + 1, y))
            } else if ay * 10_000 > ax * TAN_67_5 {
                (mag_at(x, y - 1), mag_at(x, y + 1))
            } else if (gx[i] > 0) == (gy[i] > 0) {
                (mag_at(x - 1, y - 1), mag_at(x + 1, y + 1))
            } else {
                (mag_at(x + 1, y - 1), mag_at(x - 1, y + 1))
            };
            // Strict on one side so a two-pixel-wide ridge keeps a single line.
            if m > a && m >= b {
                thinned[i] = m;
            }
        }
    }
    thinned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image(width: u32, height: u32, boundary: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            image::Luma([if x < boundary { 0 } else { 255 }])
        })
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let gray = GrayImage::from_pixel(12, 8, image::Luma([90]));
        let edges = detect_edges(&gray, 100, 200);
        assert!(edges.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn vertical_step_yields_single_column() {
        let edges = detect_edges(&step_image(10, 6, 5), 100, 200);
        for y in 0..6 {
            for x in 0..10 {
                let expected = if x == 4 { EDGE } else { 0 };
                assert_eq!(edges.get_pixel(x, y)[0], expected, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn weak_edges_need_a_strong_neighbor() {
        // Step of 40 gives magnitude 160: weak for (100, 200), strong for (100, 150).
        let gray = GrayImage::from_fn(10, 6, |x, _| image::Luma([if x < 5 { 100 } else { 140 }]));
        assert!(detect_edges(&gray, 100, 200).as_raw().iter().all(|&v| v == 0));
        assert!(detect_edges(&gray, 100, 150).as_raw().iter().any(|&v| v == EDGE));
    }

    #[test]
    fn zero_upper_threshold_marks_everything() {
        let edges = detect_edges(&step_image(7, 7, 3), 0, 0);
        assert!(edges.as_raw().iter().all(|&v| v == EDGE));
    }

    #[test]
    fn empty_image_is_empty() {
        let edges = detect_edges(&GrayImage::new(0, 0), 10, 20);
        assert_eq!(edges.dimensions(), (0, 0));
    }
}
