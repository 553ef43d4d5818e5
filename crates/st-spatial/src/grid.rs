//! Recursive grid index over intersection points.
//!
//! The region is split into quadrants recursively down to a fixed depth, the
//! *degree*.  Only leaves at full depth hold entries and branches are
//! allocated lazily, so sparse regions cost nothing.  Lookups visit every
//! leaf whose cell overlaps the tolerance box around the query point, which
//! makes points sitting on (or just across) a cell boundary match correctly.

use st_core::{IntersectionId, Point, Rect};

/// Leaf cells are at most about this wide when the degree is derived.
pub const TARGET_CELL_M: f64 = 200.0;

/// Upper bound on the depth; 4^12 leaves is far beyond any city.
pub const MAX_DEGREE: u32 = 12;

/// Depth needed for leaves of roughly [`TARGET_CELL_M`] over `extent` metres.
pub fn derive_degree(extent: f64) -> u32 {
    if !(extent > TARGET_CELL_M) {
        return 0;
    }
    ((extent / TARGET_CELL_M).log2().ceil() as u32).min(MAX_DEGREE)
}

enum Cell {
    Empty,
    Leaf(Vec<(Point, IntersectionId)>),
    Split(Box<[Cell; 4]>),
}

/// Quadrant index of `p` inside `rect`: bit 0 = east half, bit 1 = south half.
#[inline]
fn quadrant(rect: &Rect, p: Point) -> usize {
    let mid_x = 0.5 * (rect.min.x + rect.max.x);
    let mid_y = 0.5 * (rect.min.y + rect.max.y);
    (p.x >= mid_x) as usize | (((p.y >= mid_y) as usize) << 1)
}

#[inline]
fn child_rect(rect: &Rect, q: usize) -> Rect {
    let mid = Point::new(0.5 * (rect.min.x + rect.max.x), 0.5 * (rect.min.y + rect.max.y));
    let (x0, x1) = if q & 1 == 0 { (rect.min.x, mid.x) } else { (mid.x, rect.max.x) };
    let (y0, y1) = if q & 2 == 0 { (rect.min.y, mid.y) } else { (mid.y, rect.max.y) };
    Rect::new(Point::new(x0, y0), Point::new(x1, y1))
}

fn insert_at(cell: &mut Cell, rect: Rect, depth: u32, degree: u32, entry: (Point, IntersectionId)) {
    if depth == degree {
        match cell {
            Cell::Leaf(entries) => entries.push(entry),
            _ => *cell = Cell::Leaf(vec![entry]),
        }
        return;
    }
    if !matches!(cell, Cell::Split(_)) {
        *cell = Cell::Split(Box::new([Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty]));
    }
    if let Cell::Split(children) = cell {
        let q = quadrant(&rect, entry.0);
        insert_at(&mut children[q], child_rect(&rect, q), depth + 1, degree, entry);
    }
}

fn visit<F: FnMut(Point, IntersectionId)>(cell: &Cell, rect: Rect, query: &Rect, f: &mut F) {
    match cell {
        Cell::Empty => {}
        Cell::Leaf(entries) => {
            for &(p, id) in entries {
                f(p, id);
            }
        }
        Cell::Split(children) => {
            for (q, child) in children.iter().enumerate() {
                let r = child_rect(&rect, q);
                if r.intersects(query) {
                    visit(child, r, query, f);
                }
            }
        }
    }
}

/// Intersection index that merges points within a resolution tolerance.
pub struct IntersectionGrid {
    bounds:    Rect,
    degree:    u32,
    tolerance: f64,
    root:      Cell,
    len:       usize,
}

impl IntersectionGrid {
    /// `degree = None` derives the depth from the larger side of `bounds`.
    pub fn new(bounds: Rect, degree: Option<u32>, tolerance: f64) -> Self {
        let degree = degree
            .unwrap_or_else(|| derive_degree(bounds.width().max(bounds.height())))
            .min(MAX_DEGREE);
        Self { bounds, degree, tolerance, root: Cell::Empty, len: 0 }
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `id` at `p` without merging.
    pub fn insert(&mut self, p: Point, id: IntersectionId) {
        insert_at(&mut self.root, self.bounds, 0, self.degree, (p, id));
        self.len += 1;
    }

    /// Return the entry within the tolerance of `p`, or store a new one
    /// produced by `make`.  The flag is `true` when an existing entry matched.
    pub fn insert_or_merge(&mut self, p: Point, make: impl FnOnce() -> IntersectionId) -> (IntersectionId, bool) {
        if let Some(id) = self.find(p) {
            return (id, true);
        }
        let id = make();
        self.insert(p, id);
        (id, false)
    }

    /// Nearest entry within the tolerance of `p`.
    pub fn find(&self, p: Point) -> Option<IntersectionId> {
        let query = Rect::around(p, self.tolerance);
        let mut best: Option<(f64, IntersectionId)> = None;
        visit(&self.root, self.bounds, &query, &mut |q, id| {
            let d = p.distance(q);
            if d <= self.tolerance && best.is_none_or(|(bd, bid)| d < bd || (d == bd && id < bid)) {
                best = Some((d, id));
            }
        });
        best.map(|(_, id)| id)
    }

    /// All entries within `radius` of `p`, nearest first.
    pub fn within(&self, p: Point, radius: f64) -> Vec<IntersectionId> {
        let query = Rect::around(p, radius);
        let mut hits: Vec<(f64, IntersectionId)> = Vec::new();
        visit(&self.root, self.bounds, &query, &mut |q, id| {
            let d = p.distance(q);
            if d <= radius {
                hits.push((d, id));
            }
        });
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }
}
