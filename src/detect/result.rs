/// Axis-aligned box in pixel coordinates of the frame it was detected in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Every edge within `eps` of the smaller box's mean side length.
    fn similar(&self, other: &BoundingBox, eps: f64) -> bool {
        let delta = eps
            * (f64::from(self.width.min(other.width)) + f64::from(self.height.min(other.height)))
            * 0.5;
        let close = |a: u32, b: u32| (f64::from(a) - f64::from(b)).abs() <= delta;
        close(self.x, other.x)
            && close(self.y, other.y)
            && close(self.right(), other.right())
            && close(self.bottom(), other.bottom())
    }

    /// `self` lies inside `outer` grown by `eps` of its size on each side.
    fn inside(&self, outer: &BoundingBox, eps: f64) -> bool {
        let dx = (f64::from(outer.width) * eps).round() as i64;
        let dy = (f64::from(outer.height) * eps).round() as i64;
        i64::from(self.x) >= i64::from(outer.x) - dx
            && i64::from(self.y) >= i64::from(outer.y) - dy
            && i64::from(self.right()) <= i64::from(outer.right()) + dx
            && i64::from(self.bottom()) <= i64::from(outer.bottom()) + dy
    }
}

/// Merge overlapping raw detections.
///
/// Boxes are clustered by similarity (`eps`, typically 0.2). A cluster survives when it
/// has more than `min_neighbors` members and is replaced by the mean of its boxes.
/// Surviving clusters nested inside a clearly stronger cluster are dropped.
/// `min_neighbors == 0` returns the input unchanged.
pub fn group_rectangles(raw: &[BoundingBox], min_neighbors: u32, eps: f64) -> Vec<BoundingBox> {
    if min_neighbors == 0 || raw.is_empty() {
        return raw.to_vec();
    }

    // Union-find over pairwise similarity.
    let mut parent: Vec<usize> = (0..raw.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for i in 0..raw.len() {
        for j in (i + 1)..raw.len() {
            if raw[i].similar(&raw[j], eps) {
                let (a, b) = (find(&mut parent, i), find(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    // Accumulate per cluster: (sum x, sum y, sum w, sum h, count).
    let mut clusters: Vec<(usize, [u64; 4], u32)> = Vec::new();
    for (i, rect) in raw.iter().enumerate() {
        let root = find(&mut parent, i);
        let entry = match clusters.iter().position(|(r, _, _)| *r == root) {
            Some(idx) => &mut clusters[idx],
            None => {
                clusters.push((root, [0; 4], 0));
                let last = clusters.len() - 1;
                &mut clusters[last]
            }
        };
        entry.1[0] += u64::from(rect.x);
        entry.1[1] += u64::from(rect.y);
        entry.1[2] += u64::from(rect.width);
        entry.1[3] += u64::from(rect.height);
        entry.2 += 1;
    }

    let averaged: Vec<(BoundingBox, u32)> = clusters
        .into_iter()
        .map(|(_, sums, n)| {
            let mean = |s: u64| (s as f64 / f64::from(n)).round() as u32;
            (
                BoundingBox::new(mean(sums[0]), mean(sums[1]), mean(sums[2]), mean(sums[3])),
                n,
            )
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, (rect, n)) in averaged.iter().enumerate() {
        if *n <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, (outer, m))| {
            i != j
                && *m > min_neighbors
                && rect.inside(outer, eps)
                && (*m > (*n).max(3) || *n < 3)
        });
        if !nested {
            grouped.push(*rect);
        }
    }
    grouped
}
