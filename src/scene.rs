use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::warn;
use roxmltree::Document;

use crate::action::{ActionBuffer, ActionExecutor};
use crate::config::PlayerConfig;
use crate::error::RuntimeError;
use crate::fonts::Font;
use crate::node::Node;
use crate::stage::Stage;
use crate::value::{parse_number, Value};

type Element<'a, 'input> = roxmltree::Node<'a, 'input>;

/// Movie description loaded from a scene document.
///
/// ```xml
/// <scene version="7" fps="12" width="550" height="400">
///   <font name="Arial" bold="true"/>
///   <var name="score" type="number">0</var>
///   <action frame="1">trace('hello')</action>
///   <node name="button" x="10" y="10" width="80" height="20" button="true">
///     <event name="onPress">set_variable('_root:score', 1)</event>
///   </node>
/// </scene>
/// ```
#[derive(Debug)]
pub struct Scene {
    pub config: PlayerConfig,
    pub fonts: Vec<Font>,
    pub root: Node,
}

impl Scene {
    /// Parses a scene document into a fresh node tree rooted at `_level0`.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let scene = document.root_element();
        if !scene.has_tag_name("scene") {
            return Err(anyhow!(
                "expected <scene> root element, found <{}>",
                scene.tag_name().name()
            ));
        }

        let defaults = PlayerConfig::default();
        let config = PlayerConfig {
            version: parse_attr(&scene, "version", defaults.version)?,
            frame_rate: parse_attr(&scene, "fps", defaults.frame_rate)?,
            stage_size: Vec2::new(
                parse_attr(&scene, "width", defaults.stage_size.x)?,
                parse_attr(&scene, "height", defaults.stage_size.y)?,
            ),
            background: parse_color(&scene, "background", defaults.background)?,
            seed: parse_attr(&scene, "seed", defaults.seed)?,
        };

        let mut fonts = Vec::new();
        for element in scene.children().filter(|child| child.has_tag_name("font")) {
            let mut font = Font::new(required_attr(&element, "font", "name")?);
            font.bold = parse_attr(&element, "bold", false)?;
            font.italic = parse_attr(&element, "italic", false)?;
            fonts.push(font);
        }

        let root = Node::new("_level0");
        root.set_size(config.stage_size);
        load_contents(&scene, &root)?;
        Ok(Self {
            config,
            fonts,
            root,
        })
    }

    /// Builds a stage for the scene with its fonts registered.
    pub fn build_stage(self, executor: Box<dyn ActionExecutor>) -> Result<Stage> {
        let stage = Stage::new(self.config, self.root, executor);
        {
            let mut library = stage.vm().fonts().write();
            for font in self.fonts {
                library.add_font(font)?;
            }
        }
        Ok(stage)
    }
}

/// Reads the variables, actions and child nodes nested in `element`.
fn load_contents(element: &Element<'_, '_>, node: &Node) -> Result<()> {
    for child in element.children().filter(|child| child.is_element()) {
        match child.tag_name().name() {
            "node" => {
                let loaded = load_node(&child)?;
                node.add_child(loaded);
            }
            "var" => {
                let name = required_attr(&child, "var", "name")?;
                let value = parse_var(&child)
                    .with_context(|| format!("variable {name} on {}", node.target_path()))?;
                node.set_member(&name, value);
            }
            "action" => {
                let frame = parse_attr(&child, "frame", 1u32)?;
                let label = format!("{}#{frame}", node.target_path());
                node.add_frame_action(frame, ActionBuffer::from_source(label, &script_text(&child)));
            }
            "event" => {
                let handler = required_attr(&child, "event", "name")?;
                let label = format!("{}.{handler}", node.target_path());
                node.add_clip_event(handler, ActionBuffer::from_source(label, &script_text(&child)));
            }
            "font" => {}
            other => warn!("ignoring unknown element <{other}>"),
        }
    }
    Ok(())
}

fn load_node(element: &Element<'_, '_>) -> Result<Node> {
    let name = required_attr(element, "node", "name")?;
    let node = Node::new(name.clone());
    node.set_position(Vec2::new(
        parse_attr(element, "x", 0.0)?,
        parse_attr(element, "y", 0.0)?,
    ));
    node.set_size(Vec2::new(
        parse_attr(element, "width", 0.0)?,
        parse_attr(element, "height", 0.0)?,
    ));
    node.set_visible(parse_attr(element, "visible", true)?);
    node.set_button(parse_attr(element, "button", false)?);
    node.set_focusable(parse_attr(element, "focusable", false)?);
    node.set_total_frames(parse_attr(element, "frames", 1)?);
    if !parse_attr(element, "playing", true)? {
        node.stop();
    }
    load_contents(element, &node).with_context(|| format!("in node {name}"))?;
    Ok(node)
}

fn parse_var(element: &Element<'_, '_>) -> Result<Value> {
    let text = element.text().unwrap_or_default();
    let kind = element.attribute("type").unwrap_or("string");
    let value = match kind {
        "string" => Value::from(text),
        "number" => {
            let number = parse_number(text.trim());
            if number.is_nan() && text.trim() != "NaN" {
                return Err(invalid("number", text).into());
            }
            Value::Number(number)
        }
        "bool" => Value::Bool(parse_value("bool", text.trim())?),
        "null" => Value::Null,
        "undefined" => Value::Undefined,
        other => return Err(invalid("type", other).into()),
    };
    Ok(value)
}

fn script_text(element: &Element<'_, '_>) -> String {
    element
        .children()
        .filter_map(|child| child.text())
        .collect::<String>()
}

fn required_attr(element: &Element<'_, '_>, tag: &str, attribute: &str) -> Result<String> {
    element
        .attribute(attribute)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("<{tag}> is missing the `{attribute}` attribute"))
}

fn parse_attr<T: FromStr>(element: &Element<'_, '_>, attribute: &str, default: T) -> Result<T> {
    match element.attribute(attribute) {
        Some(text) => Ok(parse_value(attribute, text.trim())?),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(attribute: &str, text: &str) -> Result<T, RuntimeError> {
    text.parse::<T>().map_err(|_| invalid(attribute, text))
}

/// `r g b` with components in 0..=255.
fn parse_color(element: &Element<'_, '_>, attribute: &str, default: Vec3) -> Result<Vec3> {
    let Some(text) = element.attribute(attribute) else {
        return Ok(default);
    };
    let components = text
        .split_whitespace()
        .map(|component| parse_value::<f32>(attribute, component))
        .collect::<Result<Vec<_>, _>>()?;
    match components[..] {
        [r, g, b] => Ok(Vec3::new(r, g, b) / 255.0),
        _ => Err(invalid(attribute, text).into()),
    }
}

fn invalid(attribute: &str, value: &str) -> RuntimeError {
    RuntimeError::InvalidAttribute {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}
