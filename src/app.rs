use anyhow::{anyhow, Result};
use glam::{Vec2, Vec3};

use crate::node::{Node, Rect};
use crate::render::{Canvas, Viewport};
use crate::stage::Stage;

/// Canvas that writes the display list as indented text lines.
#[derive(Debug, Default)]
pub struct TextCanvas {
    lines: Vec<String>,
}

impl TextCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Canvas for TextCanvas {
    fn begin_display(&mut self, background: Vec3, viewport: Viewport, frame: Rect) {
        self.lines.clear();
        let extent = frame.max - frame.min;
        self.lines.push(format!(
            "display {}x{} in {}x{} background=({:.2}, {:.2}, {:.2})",
            extent.x,
            extent.y,
            viewport.size.x,
            viewport.size.y,
            background.x,
            background.y,
            background.z
        ));
    }

    fn draw_node(&mut self, node: &Node, depth: usize) {
        let bounds = node.bounds();
        self.lines.push(format!(
            "{}{} [{:.1}, {:.1} .. {:.1}, {:.1}]",
            "  ".repeat(depth + 1),
            node.name(),
            bounds.min.x,
            bounds.min.y,
            bounds.max.x,
            bounds.max.y
        ));
    }

    fn end_display(&mut self) {}
}

/// One line per node, depth-first from `node`.
pub fn describe_tree(node: &Node) -> Vec<String> {
    let mut lines = Vec::new();
    describe_into(node, &mut lines);
    lines
}

fn describe_into(node: &Node, lines: &mut Vec<String>) {
    let position = node.position();
    let playhead = node.playhead();
    lines.push(format!(
        " - {} pos=({:.2}, {:.2}) frame={}/{} visible={}",
        node.target_path(),
        position.x,
        position.y,
        playhead.current,
        playhead.total,
        node.is_visible()
    ));
    for child in node.children() {
        describe_into(&child, lines);
    }
}

pub fn print_final_state(stage: &Stage) {
    println!("Final node states:");
    for line in describe_tree(&stage.root()) {
        println!("{line}");
    }
}

/// Parses a `X,Y` stage coordinate.
pub fn parse_click(text: &str) -> Result<Vec2> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("click `{text}` must look like X,Y"))?;
    let x = x
        .trim()
        .parse::<f32>()
        .map_err(|err| anyhow!("invalid click x `{x}`: {err}"))?;
    let y = y
        .trim()
        .parse::<f32>()
        .map_err(|err| anyhow!("invalid click y `{y}`: {err}"))?;
    Ok(Vec2::new(x, y))
}
