use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Closed polygon produced by the collision baker, in buffer pixel coordinates.
pub type Polygon = Vec<[f32; 2]>;
/// Polyline sampled from a baked bezier path.
pub type Polyline = Vec<[f32; 2]>;

/// Pre-extracted geometry consumed read-only by components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BakedAssets {
    #[serde(default)]
    pub collision_polygons: Vec<Polygon>,
    #[serde(default)]
    pub bezier_paths: Vec<Polyline>,
}

impl BakedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_polygon(mut self, polygon: Polygon) -> Self {
        self.collision_polygons.push(polygon);
        self
    }

    pub fn with_path(mut self, path: Polyline) -> Self {
        self.bezier_paths.push(path);
        self
    }

    pub fn point_in_any_polygon(&self, point: Vec2) -> bool {
        self.collision_polygons.iter().any(|polygon| point_in_polygon(point, polygon))
    }

    pub fn path_point(&self, path: usize, index: usize) -> Option<Vec2> {
        self.bezier_paths.get(path)?.get(index).map(|[x, y]| Vec2::new(*x, *y))
    }

    pub fn path_len(&self, path: usize) -> usize {
        self.bezier_paths.get(path).map_or(0, Vec::len)
    }
}

/// Even-odd ray casting test.
pub fn point_in_polygon(point: Vec2, polygon: &[[f32; 2]]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let [xi, yi] = polygon[i];
        let [xj, yj] = polygon[j];
        if (yi > point.y) != (yj > point.y) && point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
