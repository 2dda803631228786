//! Rectangle index used for occupancy tests and tile range queries.
//!
//! Thin adapter over an `rstar` R-tree. Queries are inclusive: an item is
//! returned when its bounds touch the query rectangle, and a zero-area query
//! returns the items covering that exact point.

use crate::geo::Rect;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

type Entry<T> = GeomWithData<Rectangle<[f64; 2]>, T>;

pub struct SpatialIndex<T> {
    tree: RTree<Entry<T>>,
}

fn entry<T>(rect: Rect, data: T) -> Entry<T> {
    GeomWithData::new(
        Rectangle::from_corners([rect.min_x, rect.min_y], [rect.max_x, rect.max_y]),
        data,
    )
}

fn envelope(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min_x, rect.min_y], [rect.max_x, rect.max_y])
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn bulk_load(items: Vec<(Rect, T)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(rect, data)| entry(rect, data))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, rect: Rect, data: T) {
        self.tree.insert(entry(rect, data));
    }

    pub fn search<'a>(&'a self, rect: &Rect) -> impl Iterator<Item = (Rect, &'a T)> + use<'a, T> {
        self.tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|item| {
                let corners = item.geom();
                let (lower, upper) = (corners.lower(), corners.upper());
                (Rect::new(lower[0], lower[1], upper[0], upper[1]), &item.data)
            })
    }

    pub fn intersects_any(&self, rect: &Rect) -> bool {
        self.tree
            .locate_in_envelope_intersecting(&envelope(rect))
            .next()
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.tree.iter().map(|item| &item.data)
    }
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_loaded_items_are_searchable() {
        let index = SpatialIndex::bulk_load(vec![
            (Rect::new(0.0, 0.0, 4.0, 4.0), 1),
            (Rect::new(10.0, 10.0, 12.0, 12.0), 2),
            (Rect::new(20.0, 0.0, 21.0, 1.0), 3),
        ]);
        let mut found: Vec<i32> = index
            .search(&Rect::new(3.0, 3.0, 11.0, 11.0))
            .map(|(_, id)| *id)
            .collect();
        found.sort();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn zero_area_query_matches_exact_points() {
        let index = SpatialIndex::bulk_load(vec![
            (Rect::point(5.0, 7.0), "a"),
            (Rect::point(5.0, 7.5), "b"),
        ]);
        let found: Vec<&str> = index.search(&Rect::point(5.0, 7.0)).map(|(_, id)| *id).collect();
        assert_eq!(found, vec!["a"]);
        assert!(!index.intersects_any(&Rect::point(5.0, 7.25)));
    }

    #[test]
    fn touching_edges_count_as_intersection() {
        let mut index = SpatialIndex::new();
        assert!(index.is_empty());
        index.insert(Rect::new(0.0, 0.0, 10.0, 10.0), ());
        assert!(index.intersects_any(&Rect::new(10.0, 5.0, 15.0, 6.0)));
        assert!(!index.intersects_any(&Rect::new(10.1, 5.0, 15.0, 6.0)));
    }

    #[test]
    fn search_reports_item_bounds() {
        let index = SpatialIndex::bulk_load(vec![(Rect::new(1.0, 2.0, 3.0, 4.0), 9u8)]);
        let (rect, id) = index.search(&Rect::point(2.0, 3.0)).next().unwrap();
        assert_eq!(*id, 9);
        assert_eq!(rect, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
