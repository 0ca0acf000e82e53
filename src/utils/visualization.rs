//! Visualization utilities for mcl_localization
//!
//! Collects plot layers and renders them with gnuplot. Maps use screen-space
//! coordinates, so the y axis is drawn top-down.

use std::path::Path;

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{
    heading_direction, LocalizationError, LocalizationResult, Point2D, Pose, Visualizable,
};
use crate::localization::world_state::WorldState;
use crate::mapping::PolygonMap;

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const WALL: &str = BLACK;
    pub const OBSTACLE: &str = GRAY;
    pub const LANDMARK: &str = ORANGE;
    pub const PARTICLE: &str = BLUE;
    pub const ESTIMATED: &str = "#35C788";
    pub const SPREADING: &str = "#DD3355";
    pub const GROUND_TRUTH: &str = RED;
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lines {
        x: Vec<f64>,
        y: Vec<f64>,
        style: PathStyle,
    },
    Points {
        x: Vec<f64>,
        y: Vec<f64>,
        style: PointStyle,
    },
}

/// Main visualizer struct
#[derive(Debug, Clone)]
pub struct Visualizer {
    layers: Vec<Layer>,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            title: String::new(),
            x_label: "x".to_string(),
            y_label: "y".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    /// Y range in map units; rendered with `min` at the top
    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Open or closed polyline through `points`
    pub fn plot_polyline(&mut self, points: &[Point2D], closed: bool, style: &PathStyle) -> &mut Self {
        let mut x: Vec<f64> = points.iter().map(|p| p.x).collect();
        let mut y: Vec<f64> = points.iter().map(|p| p.y).collect();
        if closed {
            if let Some(first) = points.first() {
                x.push(first.x);
                y.push(first.y);
            }
        }
        self.layers.push(Layer::Lines {
            x,
            y,
            style: style.clone(),
        });
        self
    }

    pub fn plot_points(&mut self, points: &[Point2D], style: &PointStyle) -> &mut Self {
        self.layers.push(Layer::Points {
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_point(&mut self, point: Point2D, style: &PointStyle) -> &mut Self {
        self.plot_points(&[point], style)
    }

    /// Position marker plus a heading tick of length `length`
    pub fn plot_pose(&mut self, pose: &Pose, length: f64, style: &PointStyle) -> &mut Self {
        let dir = heading_direction(pose.heading);
        let tip = Point2D::new(pose.x + dir.x * length, pose.y + dir.y * length);
        self.plot_point(pose.position(), style);
        let tick = PathStyle::new(&style.color, "").with_line_width(2.0);
        self.plot_polyline(&[pose.position(), tip], false, &tick)
    }

    pub fn plot_circle(&mut self, center: Point2D, radius: f64, style: &PathStyle) -> &mut Self {
        const SEGMENTS: usize = 64;
        let points: Vec<Point2D> = (0..SEGMENTS)
            .map(|i| {
                let a = i as f64 / SEGMENTS as f64 * std::f64::consts::TAU;
                Point2D::new(center.x + radius * a.cos(), center.y + radius * a.sin())
            })
            .collect();
        self.plot_polyline(&points, true, style)
    }

    /// Smallest and largest y over every layer
    fn y_extent(&self) -> Option<(f64, f64)> {
        let ys = self.layers.iter().flat_map(|layer| match layer {
            Layer::Lines { y, .. } | Layer::Points { y, .. } => y.iter().copied(),
        });
        ys.fold(None, |extent, y| match extent {
            None => Some((y, y)),
            Some((min, max)) => Some((f64::min(min, y), f64::max(max, y))),
        })
        .filter(|(min, max)| max > min)
    }

    pub fn draw<V: Visualizable + ?Sized>(&mut self, item: &V) -> &mut Self {
        item.visualize(self);
        self
    }

    /// Build a gnuplot figure from the collected layers
    pub fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();

        for layer in &self.layers {
            match layer {
                Layer::Lines { x, y, style } => {
                    axes.lines(
                        x,
                        y,
                        &[
                            Caption(&style.caption),
                            Color(&style.color),
                            LineWidth(style.line_width),
                        ],
                    );
                }
                Layer::Points { x, y, style } => {
                    axes.points(
                        x,
                        y,
                        &[
                            Caption(&style.caption),
                            Color(&style.color),
                            PointSymbol(style.symbol),
                            PointSize(style.size),
                        ],
                    );
                }
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some((min, max)) = self.x_range {
            axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }
        if let Some((min, max)) = self.y_range.or_else(|| self.y_extent()) {
            axes.set_y_range(AutoOption::Fix(max), AutoOption::Fix(min));
        }
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
        figure
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P, width: u32, height: u32) -> LocalizationResult<()> {
        self.render()
            .save_to_png(path.as_ref(), width, height)
            .map_err(|e| LocalizationError::Render(e.to_string()))
    }

    pub fn save_svg<P: AsRef<Path>>(&self, path: P, width: u32, height: u32) -> LocalizationResult<()> {
        self.render()
            .save_to_svg(path.as_ref(), width, height)
            .map_err(|e| LocalizationError::Render(e.to_string()))
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualizable for PolygonMap {
    fn visualize(&self, vis: &mut Visualizer) {
        vis.plot_polyline(self.boundary(), true, &PathStyle::new(colors::WALL, "Walls"));
        for obstacle in self.obstacles() {
            vis.plot_polyline(obstacle, true, &PathStyle::new(colors::OBSTACLE, ""));
        }
        if !self.landmarks().is_empty() {
            let positions: Vec<Point2D> = self.landmarks().iter().map(|l| l.position).collect();
            vis.plot_points(
                &positions,
                &PointStyle::new(colors::LANDMARK, "Landmarks")
                    .with_symbol('S')
                    .with_size(1.5),
            );
        }
    }
}

impl Visualizable for WorldState {
    fn visualize(&self, vis: &mut Visualizer) {
        let positions: Vec<Point2D> = self.particles.iter().map(|p| p.position()).collect();
        vis.plot_points(
            &positions,
            &PointStyle::new(colors::PARTICLE, "Particles")
                .with_symbol('.')
                .with_size(0.8),
        );
        vis.plot_circle(
            self.estimated_pose.position(),
            self.estimated_spreading,
            &PathStyle::new(colors::SPREADING, "Spreading").with_line_width(1.0),
        );
        let tick = self.estimated_spreading.max(5.0);
        vis.plot_pose(
            &self.estimated_pose,
            tick,
            &PointStyle::new(colors::ESTIMATED, "Estimate").with_size(1.5),
        );
    }
}

/// Map plus one recorded state, titled with its instruction
pub fn plot_world_state(map: &PolygonMap, state: &WorldState, index: usize) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(&format!(
        "#{} {} ({:?})",
        index, state.causative_instruction, state.convergence
    ));
    vis.draw(map).draw(state);
    vis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::convergence::ConvergenceState;
    use crate::localization::particle::Particle;
    use crate::mapping::Landmark;

    fn state() -> WorldState {
        WorldState {
            particles: vec![Particle::new(Pose::new(10.0, 10.0, 0.0)); 4],
            estimated_pose: Pose::new(10.0, 10.0, 0.0),
            estimated_spreading: 3.0,
            causative_instruction: "move 10".to_string(),
            sensor_reading: None,
            map_key: "arena".to_string(),
            convergence: ConvergenceState::Searching,
        }
    }

    #[test]
    fn test_visualizer_creation() {
        let vis = Visualizer::new();
        assert!(vis.aspect_ratio.is_some());
        assert_eq!(vis.layer_count(), 0);
    }

    #[test]
    fn test_path_style() {
        let style = PathStyle::new(colors::RED, "Test Path").with_line_width(3.0);
        assert_eq!(style.line_width, 3.0);
        assert_eq!(style.color, colors::RED);
    }

    #[test]
    fn test_closed_polyline_returns_to_start() {
        let mut vis = Visualizer::new();
        let square = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
        ];
        vis.plot_polyline(&square, true, &PathStyle::new(colors::WALL, ""));
        match &vis.layers[0] {
            Layer::Lines { x, y, .. } => {
                assert_eq!(x.len(), 4);
                assert_eq!((x[3], y[3]), (0.0, 0.0));
            }
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn test_heading_tick_points_up_on_screen() {
        let mut vis = Visualizer::new();
        vis.plot_pose(&Pose::new(5.0, 5.0, 90.0), 2.0, &PointStyle::new(colors::ESTIMATED, ""));
        match &vis.layers[1] {
            Layer::Lines { y, .. } => assert!(y[1] < y[0]),
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn test_y_extent_spans_layers() {
        let mut vis = Visualizer::new();
        assert!(vis.y_extent().is_none());
        vis.plot_points(&[Point2D::new(0.0, 4.0)], &PointStyle::new(colors::BLUE, ""));
        vis.plot_polyline(
            &[Point2D::new(0.0, -2.0), Point2D::new(1.0, 9.0)],
            false,
            &PathStyle::new(colors::WALL, ""),
        );
        assert_eq!(vis.y_extent(), Some((-2.0, 9.0)));
    }

    #[test]
    fn test_world_state_layers() {
        let map = PolygonMap::rectangle("arena", 50.0, 50.0)
            .unwrap()
            .with_landmark(Landmark::new(1, Point2D::new(50.0, 25.0), 5.0));
        let vis = plot_world_state(&map, &state(), 3);
        // walls, landmarks, particles, spreading circle, estimate point and tick
        assert_eq!(vis.layer_count(), 6);
        assert!(vis.title.starts_with("#3 move 10"));
    }
}
