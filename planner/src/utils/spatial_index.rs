use crate::data::poi::PlanarPoint;
use std::fmt;

const NODE_CAPACITY: usize = 16;
const MIN_HALF_SIZE_KM: f64 = 0.01;

#[derive(Clone, Debug)]
pub struct QuadTreeNode {
    boundary: Boundary,
    children: Option<Box<[QuadTreeNode; 4]>>,
    points: Vec<(usize, PlanarPoint)>,
}

#[derive(Clone, Debug)]
pub struct Boundary {
    center: PlanarPoint,
    half_width: f64,
    half_height: f64,
}

impl QuadTreeNode {
    pub fn new(center: PlanarPoint, half_width: f64, half_height: f64) -> Self {
        Self {
            boundary: Boundary {
                center,
                half_width,
                half_height,
            },
            children: None,
            points: Vec::new(),
        }
    }

    pub fn subdivide(&mut self) {
        let x = self.boundary.center.x;
        let y = self.boundary.center.y;
        let hw = self.boundary.half_width / 2.0;
        let hh = self.boundary.half_height / 2.0;

        let mut children = Box::new([
            // Northwest
            QuadTreeNode::new(PlanarPoint { x: x - hw, y: y + hh }, hw, hh),
            // Northeast
            QuadTreeNode::new(PlanarPoint { x: x + hw, y: y + hh }, hw, hh),
            // Southwest
            QuadTreeNode::new(PlanarPoint { x: x - hw, y: y - hh }, hw, hh),
            // Southeast
            QuadTreeNode::new(PlanarPoint { x: x + hw, y: y - hh }, hw, hh),
        ]);

        for (index, point) in self.points.drain(..) {
            if let Some(child) = children.iter_mut().find(|c| c.contains_point(&point)) {
                child.insert(index, point);
            }
        }

        self.children = Some(children);
    }

    pub fn contains_point(&self, point: &PlanarPoint) -> bool {
        point.x >= self.boundary.center.x - self.boundary.half_width &&
        point.x <= self.boundary.center.x + self.boundary.half_width &&
        point.y >= self.boundary.center.y - self.boundary.half_height &&
        point.y <= self.boundary.center.y + self.boundary.half_height
    }

    fn insert(&mut self, index: usize, point: PlanarPoint) -> bool {
        if !self.contains_point(&point) {
            return false;
        }

        if let Some(children) = &mut self.children {
            return children.iter_mut().any(|child| child.insert(index, point));
        }

        self.points.push((index, point));
        if self.points.len() > NODE_CAPACITY && self.boundary.half_width > MIN_HALF_SIZE_KM {
            self.subdivide();
        }
        true
    }

    pub fn intersects_circle(&self, center: &PlanarPoint, radius: f64) -> bool {
        // Distance from the circle centre to the closest point of the box
        let dx = ((center.x - self.boundary.center.x).abs() - self.boundary.half_width).max(0.0);
        let dy = ((center.y - self.boundary.center.y).abs() - self.boundary.half_height).max(0.0);
        dx * dx + dy * dy <= radius * radius
    }
}

/// Point quadtree over settlement positions in km, answering radius queries
/// with the indices the points were built from.
#[derive(Clone)]
pub struct SpatialIndex {
    root: QuadTreeNode,
    len: usize,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.len)
            .finish()
    }
}

impl SpatialIndex {
    pub fn new(points: &[(usize, PlanarPoint)]) -> Self {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (_, p) in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if points.is_empty() {
            (min_x, min_y, max_x, max_y) = (0.0, 0.0, 0.0, 0.0);
        }

        let half = ((max_x - min_x).max(max_y - min_y) / 2.0).max(MIN_HALF_SIZE_KM) + MIN_HALF_SIZE_KM;
        let center = PlanarPoint {
            x: (min_x + max_x) / 2.0,
            y: (min_y + max_y) / 2.0,
        };

        let mut root = QuadTreeNode::new(center, half, half);
        let mut len = 0;
        for (index, point) in points {
            if root.insert(*index, *point) {
                len += 1;
            }
        }
        Self { root, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices within `radius` km of `center` with their distances, nearest first.
    pub fn within_radius(&self, center: &PlanarPoint, radius: f64) -> Vec<(usize, f64)> {
        let mut found = Vec::new();
        let mut stack = vec![&self.root];

        while let Some(node) = stack.pop() {
            if !node.intersects_circle(center, radius) {
                continue;
            }
            for (index, point) in &node.points {
                let distance = center.distance_to(point);
                if distance <= radius {
                    found.push((*index, distance));
                }
            }
            if let Some(children) = &node.children {
                stack.extend(children.iter());
            }
        }

        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points(n: usize) -> Vec<(usize, PlanarPoint)> {
        (0..n * n)
            .map(|i| (i, PlanarPoint { x: (i % n) as f64, y: (i / n) as f64 }))
            .collect()
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let points = grid_points(20);
        let index = SpatialIndex::new(&points);
        assert_eq!(index.len(), 400);

        let center = PlanarPoint { x: 7.3, y: 11.8 };
        let found: Vec<usize> = index.within_radius(&center, 3.5).into_iter().map(|(i, _)| i).collect();
        let mut expected: Vec<usize> = points
            .iter()
            .filter(|(_, p)| p.distance_to(&center) <= 3.5)
            .map(|(i, _)| *i)
            .collect();
        let mut sorted = found.clone();
        sorted.sort();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn results_are_nearest_first() {
        let index = SpatialIndex::new(&grid_points(5));
        let found = index.within_radius(&PlanarPoint { x: 0.0, y: 0.0 }, 10.0);
        assert_eq!(found[0], (0, 0.0));
        assert!(found.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn coincident_points_are_kept() {
        let same = PlanarPoint { x: 1.0, y: 1.0 };
        let points: Vec<_> = (0..50).map(|i| (i, same)).collect();
        let index = SpatialIndex::new(&points);
        assert_eq!(index.within_radius(&same, 0.0).len(), 50);
    }
}
