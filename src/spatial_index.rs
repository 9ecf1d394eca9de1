//! # Candidate spatial index
//!
//! Footprints are buffered in the projected frame (a regular polygon approximating a circle of
//! radius `buffer_distance`) and bulk-loaded into an [`rstar::RTree`] keyed by the polygons'
//! bounding boxes.
//!
//! A query runs in two phases:
//!
//! 1. **Broad phase** – R-tree lookup of every bounding box intersecting the query point.
//! 2. **Narrow phase** – exact point-in-polygon test ([`geo::Contains`]) against the
//!    buffered polygon, which drops the bounding-box corners.
//!
//! The buffer polygon is inscribed in the circle, so any accepted point is at most
//! `buffer_distance` from the footprint centre. The index is immutable after construction and
//! safe to share between threads.
use geo::{BoundingRect, Contains, Coord, Intersects, LineString, Polygon, Rect};
use nalgebra::Point2;
use rstar::{RTree, RTreeObject, AABB};

use crate::constants::Meter;

#[inline]
fn to_geo(p: &Point2<f64>) -> geo::Point<f64> {
    geo::Point::new(p.x, p.y)
}

/// Buffer polygon with its cached envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedRegion {
    pub polygon: Polygon<f64>,
    pub envelope: Rect<f64>,
}

impl BufferedRegion {
    /// Regular polygon around `center` with `4 * quad_segments` vertices on the circle.
    pub fn circle(center: Point2<f64>, radius: Meter, quad_segments: usize) -> Self {
        let n = 4 * quad_segments.max(1);
        let step = std::f64::consts::TAU / n as f64;
        let ring: Vec<Coord<f64>> = (0..n)
            .map(|k| {
                let (s, c) = (k as f64 * step).sin_cos();
                Coord {
                    x: center.x + radius * c,
                    y: center.y + radius * s,
                }
            })
            .collect();
        // `Polygon::new` closes the ring
        let polygon = Polygon::new(LineString::new(ring), vec![]);
        let envelope = polygon.bounding_rect().unwrap_or_else(|| {
            let c = Coord {
                x: center.x,
                y: center.y,
            };
            Rect::new(c, c)
        });
        BufferedRegion { polygon, envelope }
    }

    /// Distinct ring vertices, without the closing coordinate.
    pub fn vertices(&self) -> impl Iterator<Item = Point2<f64>> + '_ {
        let ring = self.polygon.exterior();
        ring.coords()
            .take(ring.0.len().saturating_sub(1))
            .map(|c| Point2::new(c.x, c.y))
    }

    #[inline]
    pub fn bbox_contains(&self, p: &Point2<f64>) -> bool {
        self.envelope.intersects(&Coord { x: p.x, y: p.y })
    }

    pub fn contains(&self, p: &Point2<f64>) -> bool {
        self.bbox_contains(p) && self.polygon.contains(&to_geo(p))
    }
}

/// A footprint's projected centre and buffered region, keyed by its position in the
/// footprint list.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedFootprint {
    pub id: usize,
    pub center: Point2<f64>,
    pub region: BufferedRegion,
}

impl RTreeObject for BufferedFootprint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (min, max) = (self.region.envelope.min(), self.region.envelope.max());
        AABB::from_corners([min.x, min.y], [max.x, max.y])
    }
}

/// R-tree over buffered footprints.
#[derive(Debug)]
pub struct CandidateIndex {
    tree: RTree<BufferedFootprint>,
    buffer_distance: Meter,
}

impl CandidateIndex {
    /// Buffer every `(id, projected centre)` pair and bulk-load the tree.
    pub fn build<I>(centers: I, buffer_distance: Meter, quad_segments: usize) -> Self
    where
        I: IntoIterator<Item = (usize, Point2<f64>)>,
    {
        let items: Vec<BufferedFootprint> = centers
            .into_iter()
            .filter(|(_, c)| c.x.is_finite() && c.y.is_finite())
            .map(|(id, center)| BufferedFootprint {
                id,
                center,
                region: BufferedRegion::circle(center, buffer_distance, quad_segments),
            })
            .collect();
        CandidateIndex {
            tree: RTree::bulk_load(items),
            buffer_distance,
        }
    }

    pub fn buffer_distance(&self) -> Meter {
        self.buffer_distance
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Footprints whose bounding box contains `p`.
    pub fn broad_phase<'a>(
        &'a self,
        p: &Point2<f64>,
    ) -> impl Iterator<Item = &'a BufferedFootprint> + 'a {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([p.x, p.y]))
    }

    /// Footprints whose buffered polygon contains `p`, with the distance from `p` to the
    /// (unbuffered) footprint centre.
    pub fn query<'a>(&'a self, p: Point2<f64>) -> impl Iterator<Item = (usize, Meter)> + 'a {
        self.broad_phase(&p)
            .filter(move |fp| fp.region.contains(&p))
            .map(move |fp| (fp.id, nalgebra::distance(&p, &fp.center)))
    }
}

#[cfg(test)]
mod spatial_index_test {
    use super::*;

    #[test]
    fn test_circle_polygon_is_inscribed() {
        let region = BufferedRegion::circle(Point2::new(0.0, 0.0), 25.0, 16);
        assert_eq!(region.vertices().count(), 64);
        assert_eq!(region.polygon.exterior().0.len(), 65);
        for v in region.vertices() {
            assert!((v.coords.norm() - 25.0).abs() < 1e-9);
        }
        assert!(region.contains(&Point2::new(24.9, 0.0)));
        assert!(region.contains(&Point2::new(0.0, -24.9)));
        assert!(!region.contains(&Point2::new(25.1, 0.0)));
        // inside the bounding box, outside the polygon
        assert!(region.bbox_contains(&Point2::new(24.0, 24.0)));
        assert!(!region.contains(&Point2::new(24.0, 24.0)));
    }

    #[test]
    fn test_envelope_spans_the_circle() {
        let region = BufferedRegion::circle(Point2::new(100.0, -50.0), 10.0, 4);
        let (min, max) = (region.envelope.min(), region.envelope.max());
        assert!((min.x - 90.0).abs() < 1e-9 && (max.x - 110.0).abs() < 1e-9);
        assert!((min.y + 60.0).abs() < 1e-9 && (max.y + 40.0).abs() < 1e-9);
        assert!(!region.bbox_contains(&Point2::new(110.5, -50.0)));
    }

    #[test]
    fn test_query_keeps_points_within_buffer() {
        let index = CandidateIndex::build([(0, Point2::new(1000.0, 1000.0))], 25.0, 16);

        let hits: Vec<_> = index.query(Point2::new(1010.0, 1000.0)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert!((hits[0].1 - 10.0).abs() < 1e-9);

        assert_eq!(index.query(Point2::new(1050.0, 1000.0)).count(), 0);
        assert_eq!(index.broad_phase(&Point2::new(1050.0, 1000.0)).count(), 0);
    }

    #[test]
    fn test_narrow_phase_rejects_bbox_corner() {
        let index = CandidateIndex::build([(3, Point2::new(0.0, 0.0))], 25.0, 16);
        let corner = Point2::new(23.0, 23.0);
        assert_eq!(index.broad_phase(&corner).count(), 1);
        assert_eq!(index.query(corner).count(), 0);
    }

    #[test]
    fn test_overlapping_buffers() {
        let index = CandidateIndex::build(
            [
                (0, Point2::new(0.0, 0.0)),
                (1, Point2::new(30.0, 0.0)),
                (2, Point2::new(500.0, 500.0)),
            ],
            25.0,
            16,
        );
        assert_eq!(index.len(), 3);
        let mut ids: Vec<_> = index.query(Point2::new(15.0, 0.0)).map(|(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_non_finite_centres_are_not_indexed() {
        let index = CandidateIndex::build(
            [(0, Point2::new(f64::NAN, 0.0)), (1, Point2::new(0.0, 0.0))],
            25.0,
            16,
        );
        assert_eq!(index.len(), 1);
    }
}
