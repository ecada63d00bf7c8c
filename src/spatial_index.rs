//! Spatial index over street segments.
//!
//! Uses an R-tree of projected segment bounding boxes so each track only
//! tests the segments near it instead of the whole network.

use geo::{BoundingRect, Coord, LineString, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::geo_utils::LocalProjection;
use crate::segmenter::StreetSegment;
use crate::SegmentId;

/// A segment in projected (planar meter) coordinates, ready for intersection.
#[derive(Debug, Clone)]
pub struct IndexedSegment {
    pub id: SegmentId,
    /// Projected vertices
    pub coords: Vec<Coord<f64>>,
    /// Planar arc length at each vertex
    pub cumulative: Vec<f64>,
    /// Planar length in meters
    pub length: f64,
    /// Projected bounding box
    pub envelope: AABB<[f64; 2]>,
}

impl IndexedSegment {
    /// Project a street segment.
    pub fn from_segment(segment: &StreetSegment, projection: &LocalProjection) -> Self {
        let line = LineString::new(projection.project_all(&segment.points));
        let envelope = line
            .bounding_rect()
            .map(rect_to_aabb)
            .unwrap_or_else(|| AABB::from_point([0.0, 0.0]));

        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        for (i, c) in line.0.iter().enumerate() {
            if i > 0 {
                let prev = line.0[i - 1];
                total += (c.x - prev.x).hypot(c.y - prev.y);
            }
            cumulative.push(total);
        }

        Self {
            id: segment.id,
            coords: line.0,
            cumulative,
            length: total,
            envelope,
        }
    }
}

/// Convert a geo rectangle to an R-tree envelope.
pub fn rect_to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Bounding box tagged with its position in [`SegmentIndex`]'s entries.
type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// R-tree of segment bounding boxes, built once after segmentation.
///
/// The tree only holds boxes; projected geometry lives once in `entries`.
#[derive(Debug)]
pub struct SegmentIndex {
    tree: RTree<IndexedBox>,
    /// Dense lookup by segment id
    by_id: Vec<Option<usize>>,
    entries: Vec<IndexedSegment>,
}

impl SegmentIndex {
    /// Bulk-load the index from segments.
    pub fn build(segments: &[StreetSegment], projection: &LocalProjection) -> Self {
        let entries: Vec<IndexedSegment> = segments
            .iter()
            .map(|s| IndexedSegment::from_segment(s, projection))
            .collect();

        let max_id = entries.iter().map(|e| e.id as usize + 1).max().unwrap_or(0);
        let mut by_id = vec![None; max_id];
        for (i, entry) in entries.iter().enumerate() {
            by_id[entry.id as usize] = Some(i);
        }

        let boxes: Vec<IndexedBox> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| GeomWithData::new(Rectangle::from_aabb(entry.envelope), i))
            .collect();

        Self {
            tree: RTree::bulk_load(boxes),
            by_id,
            entries,
        }
    }

    /// Ids of segments whose bounding boxes intersect `envelope`.
    pub fn query(&self, envelope: &AABB<[f64; 2]>) -> Vec<SegmentId> {
        self.candidates(envelope).map(|s| s.id).collect()
    }

    /// Ids of segments whose bounding boxes intersect the bounding box of `line`.
    pub fn query_geometry(&self, line: &LineString<f64>) -> Vec<SegmentId> {
        match line.bounding_rect() {
            Some(rect) => self.query(&rect_to_aabb(rect)),
            None => Vec::new(),
        }
    }

    /// Indexed segments whose bounding boxes intersect `envelope`.
    pub fn candidates<'a>(
        &'a self,
        envelope: &AABB<[f64; 2]>,
    ) -> impl Iterator<Item = &'a IndexedSegment> + 'a {
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .map(move |b| &self.entries[b.data])
    }

    pub fn get(&self, id: SegmentId) -> Option<&IndexedSegment> {
        self.by_id
            .get(id as usize)
            .copied()
            .flatten()
            .map(|i| &self.entries[i])
    }

    /// Number of indexed segments.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn segment(id: SegmentId, a: GpsPoint, b: GpsPoint) -> StreetSegment {
        StreetSegment {
            id,
            street_id: id as u64,
            points: vec![a, b],
            length_m: crate::geo_utils::haversine_distance(&a, &b),
            road_class: "residential".to_string(),
        }
    }

    fn setup() -> (SegmentIndex, LocalProjection) {
        let projection = LocalProjection::new(GpsPoint::new(42.39, -71.10));
        let segments = vec![
            segment(0, GpsPoint::new(42.390, -71.100), GpsPoint::new(42.391, -71.100)),
            segment(1, GpsPoint::new(42.400, -71.100), GpsPoint::new(42.401, -71.100)),
            segment(2, GpsPoint::new(42.390, -71.090), GpsPoint::new(42.390, -71.089)),
        ];
        (SegmentIndex::build(&segments, &projection), projection)
    }

    #[test]
    fn test_build() {
        let (index, _) = setup();
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
        assert!(index.get(2).is_some());
        assert!(index.get(3).is_none());
    }

    #[test]
    fn test_query_finds_only_nearby() {
        let (index, projection) = setup();
        let p = projection.project(&GpsPoint::new(42.3905, -71.1000));
        let envelope = AABB::from_corners([p.x - 20.0, p.y - 20.0], [p.x + 20.0, p.y + 20.0]);
        assert_eq!(index.query(&envelope), vec![0]);
    }

    #[test]
    fn test_query_empty_area() {
        let (index, _) = setup();
        let envelope = AABB::from_corners([50_000.0, 50_000.0], [50_100.0, 50_100.0]);
        assert!(index.query(&envelope).is_empty());
    }

    #[test]
    fn test_query_geometry_spanning_segments() {
        let (index, projection) = setup();
        let line: LineString<f64> = LineString::new(vec![
            projection.project(&GpsPoint::new(42.3895, -71.1005)),
            projection.project(&GpsPoint::new(42.4015, -71.0995)),
        ]);
        let mut ids = index.query_geometry(&line);
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_planar_length_close_to_haversine() {
        let (index, _) = setup();
        let entry = index.get(0).unwrap();
        assert!((entry.length - 111.2).abs() < 0.5);
        assert_eq!(entry.cumulative.len(), entry.coords.len());
    }

    #[test]
    fn test_candidates_resolve_to_stored_geometry() {
        let (index, projection) = setup();
        let p = projection.project(&GpsPoint::new(42.3900, -71.0895));
        let envelope = AABB::from_corners([p.x - 50.0, p.y - 10.0], [p.x + 50.0, p.y + 10.0]);

        let found: Vec<&IndexedSegment> = index.candidates(&envelope).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
        assert!(std::ptr::eq(found[0], index.get(2).unwrap()));
    }
}
