//! Polygonal map with ray-cast distances and landmark vision
//!
//! The outer boundary is both the operating region and the outer wall.
//! Obstacles are closed polygons carved out of the region. Landmarks carry
//! a camera signature and are seen when inside the field of view and not
//! hidden behind a wall.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::common::{
    heading_direction, normalize_degrees, Bounds, Environment, LocalizationError,
    LocalizationResult, Point2D, VisionDetection,
};

const EPSILON: f64 = 1e-9;
/// Default camera field of view [deg]
const DEFAULT_FIELD_OF_VIEW: f64 = 75.0;

/// A colored marker the camera is trained on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub signature: u8,
    pub position: Point2D,
    pub width: f64,
}

impl Landmark {
    pub fn new(signature: u8, position: Point2D, width: f64) -> Self {
        Landmark {
            signature,
            position,
            width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonMap {
    key: String,
    boundary: Vec<Point2D>,
    obstacles: Vec<Vec<Point2D>>,
    landmarks: Vec<Landmark>,
    field_of_view: f64,
    max_range: Option<f64>,
}

impl PolygonMap {
    /// Create a map from its outer boundary
    pub fn new(key: &str, boundary: Vec<Point2D>) -> LocalizationResult<Self> {
        validate_polygon(&boundary)?;
        Ok(PolygonMap {
            key: key.to_string(),
            boundary,
            obstacles: Vec::new(),
            landmarks: Vec::new(),
            field_of_view: DEFAULT_FIELD_OF_VIEW,
            max_range: None,
        })
    }

    /// Axis-aligned rectangular arena with its corner at the origin
    pub fn rectangle(key: &str, width: f64, height: f64) -> LocalizationResult<Self> {
        Self::new(
            key,
            vec![
                Point2D::new(0.0, 0.0),
                Point2D::new(width, 0.0),
                Point2D::new(width, height),
                Point2D::new(0.0, height),
            ],
        )
    }

    pub fn with_obstacle(mut self, polygon: Vec<Point2D>) -> LocalizationResult<Self> {
        validate_polygon(&polygon)?;
        self.obstacles.push(polygon);
        Ok(self)
    }

    pub fn with_landmark(mut self, landmark: Landmark) -> Self {
        self.landmarks.push(landmark);
        self
    }

    pub fn with_field_of_view(mut self, degrees: f64) -> Self {
        self.field_of_view = degrees;
        self
    }

    /// Rays longer than this report no echo
    pub fn with_max_range(mut self, range: f64) -> Self {
        self.max_range = Some(range);
        self
    }

    pub fn boundary(&self) -> &[Point2D] {
        &self.boundary
    }

    pub fn obstacles(&self) -> &[Vec<Point2D>] {
        &self.obstacles
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Read a map previously written with [`PolygonMap::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> LocalizationResult<Self> {
        let map: PolygonMap = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        validate_polygon(&map.boundary)?;
        for obstacle in &map.obstacles {
            validate_polygon(obstacle)?;
        }
        Ok(map)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> LocalizationResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn walls(&self) -> impl Iterator<Item = (Point2D, Point2D)> + '_ {
        std::iter::once(&self.boundary)
            .chain(self.obstacles.iter())
            .flat_map(|polygon| polygon.iter().copied().circular_tuple_windows())
    }

    /// Distance to the closest wall along the ray, if any
    fn cast(&self, origin: Point2D, direction: Vector2<f64>) -> Option<f64> {
        self.walls()
            .filter_map(|(a, b)| ray_segment_intersection(origin, direction, a, b))
            .fold(None, |best: Option<f64>, t| match best {
                Some(b) if b <= t => Some(b),
                _ => Some(t),
            })
    }
}

impl Environment for PolygonMap {
    fn key(&self) -> &str {
        &self.key
    }

    fn bounds(&self) -> Bounds {
        // the boundary is validated non-empty at construction
        Bounds::from_points(&self.boundary)
            .unwrap_or_else(|| Bounds::new(Point2D::origin(), Point2D::origin()))
    }

    fn contains(&self, point: Point2D) -> bool {
        point_in_polygon(point, &self.boundary)
            && !self.obstacles.iter().any(|o| point_in_polygon(point, o))
    }

    fn nearest_obstacle_distance(&self, origin: Point2D, heading: f64) -> f64 {
        match self.cast(origin, heading_direction(heading)) {
            Some(d) if self.max_range.map_or(true, |max| d <= max) => d,
            _ => -1.0,
        }
    }

    fn vision_query(&self, origin: Point2D, heading: f64, signature: u8) -> VisionDetection {
        let landmark = match self.landmarks.iter().find(|l| l.signature == signature) {
            Some(landmark) => landmark,
            None => return VisionDetection::none(),
        };

        let to_landmark = landmark.position.to_vector() - origin.to_vector();
        let distance = to_landmark.norm();
        if distance < EPSILON {
            return VisionDetection::none();
        }

        // screen space: y grows downwards
        let bearing = (-to_landmark.y).atan2(to_landmark.x).to_degrees();
        let offset = signed_degrees(bearing - heading);
        if offset.abs() > self.field_of_view / 2.0 {
            return VisionDetection::none();
        }

        if let Some(wall) = self.cast(origin, to_landmark / distance) {
            if wall < distance - 1e-6 {
                return VisionDetection::none();
            }
        }

        let perceived_width = 2.0 * (landmark.width / (2.0 * distance)).atan().to_degrees();
        VisionDetection::seen(offset, perceived_width)
    }
}

fn validate_polygon(polygon: &[Point2D]) -> LocalizationResult<()> {
    if polygon.len() < 3 {
        return Err(LocalizationError::InvalidParameter(format!(
            "polygon needs at least 3 vertices, got {}",
            polygon.len()
        )));
    }
    Ok(())
}

/// Angle in degrees mapped into `(-180, 180]`
fn signed_degrees(degrees: f64) -> f64 {
    let d = normalize_degrees(degrees);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Ray parameter where `origin + t * direction` meets segment `a`-`b`
fn ray_segment_intersection(
    origin: Point2D,
    direction: Vector2<f64>,
    a: Point2D,
    b: Point2D,
) -> Option<f64> {
    let segment = b.to_vector() - a.to_vector();
    let denom = cross(&direction, &segment);
    if denom.abs() < EPSILON {
        return None;
    }
    let offset = a.to_vector() - origin.to_vector();
    let t = cross(&offset, &segment) / denom;
    let u = cross(&offset, &direction) / denom;
    if t > EPSILON && (-EPSILON..=1.0 + EPSILON).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Even-odd crossing test
fn point_in_polygon(point: Point2D, polygon: &[Point2D]) -> bool {
    polygon
        .iter()
        .circular_tuple_windows()
        .filter(|(a, b)| {
            (a.y > point.y) != (b.y > point.y)
                && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        })
        .count()
        % 2
        == 1
}
