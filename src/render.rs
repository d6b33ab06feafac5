use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::node::{Node, Rect};

/// Pixel rectangle of the output surface the stage is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(width.max(0.0), height.max(0.0)),
        }
    }

    /// Uniform scale mapping `frame` into the viewport.
    pub fn pixel_scale(&self, frame: Rect) -> f32 {
        let extent = frame.max - frame.min;
        if extent.x <= 0.0 || extent.y <= 0.0 {
            return 1.0;
        }
        (self.size.x / extent.x).max(self.size.y / extent.y)
    }
}

/// Render collaborator driven by `Stage::display`.
pub trait Canvas {
    fn begin_display(&mut self, background: Vec3, viewport: Viewport, frame: Rect);
    fn draw_node(&mut self, node: &Node, depth: usize);
    fn end_display(&mut self);
}

/// Walks visible nodes depth-first, parents before children.
pub(crate) fn draw_tree(canvas: &mut dyn Canvas, node: &Node, depth: usize) {
    if !node.is_visible() {
        return;
    }
    canvas.draw_node(node, depth);
    for child in node.children() {
        draw_tree(canvas, &child, depth + 1);
    }
}
