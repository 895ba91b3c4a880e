//! Deterministic ordering of located markers into insertion anchors.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::parse::MarkerBox;

/// A located insertion point: one marker box on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub page_number: u32,
    pub bbox: MarkerBox,
}

/// Flatten per-page marker boxes into one anchor sequence. Pages come
/// in ascending order; within a page, anchors run top-to-bottom then
/// left-to-right. The i-th value of a row is always written at the
/// i-th anchor of this sequence.
pub fn order_anchors(pages: &BTreeMap<u32, Vec<MarkerBox>>) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for (page_number, boxes) in pages {
        let mut boxes = boxes.clone();
        boxes.sort_by(|a, b| {
            b.y_max
                .partial_cmp(&a.y_max)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.x_min.partial_cmp(&b.x_min).unwrap_or(Ordering::Equal))
        });
        anchors.extend(boxes.into_iter().map(|bbox| Anchor {
            page_number: *page_number,
            bbox,
        }));
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x: f32, y: f32) -> MarkerBox {
        MarkerBox::new(x, y, x + 10.0, y + 12.0)
    }

    #[test]
    fn anchors_run_top_to_bottom_then_left_to_right() {
        // In PDF space a larger y sits higher on the page.
        let mut pages = BTreeMap::new();
        pages.insert(1, vec![boxed(50.0, 500.0), boxed(10.0, 500.0), boxed(0.0, 600.0)]);

        let anchors = order_anchors(&pages);
        let positions: Vec<(f32, f32)> = anchors
            .iter()
            .map(|a| (a.bbox.x_min, a.bbox.y_min))
            .collect();
        assert_eq!(positions, vec![(0.0, 600.0), (10.0, 500.0), (50.0, 500.0)]);
    }

    #[test]
    fn pages_flatten_in_ascending_order() {
        let mut pages = BTreeMap::new();
        pages.insert(2, vec![boxed(0.0, 700.0)]);
        pages.insert(1, vec![boxed(0.0, 100.0)]);

        let anchors = order_anchors(&pages);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].page_number, 1);
        assert_eq!(anchors[1].page_number, 2);
    }

    #[test]
    fn ordering_is_stable_across_runs() {
        let mut pages = BTreeMap::new();
        pages.insert(1, vec![boxed(30.0, 400.0), boxed(30.0, 400.0)]);
        let first = order_anchors(&pages);
        let second = order_anchors(&pages);
        assert_eq!(first, second);
    }
}
