use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::action::{ActionBuffer, ActionQueue};
use crate::environment::Environment;
use crate::event::EventId;
use crate::object::{Object, WeakObject};
use crate::value::Value;

/// Axis-aligned rectangle in stage pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self::new(origin, origin + size)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y
    }
}

/// Timeline position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Playhead {
    /// 1-based frame number.
    pub current: u32,
    pub total: u32,
    pub playing: bool,
    #[serde(skip)]
    remainder: f32,
    #[serde(skip)]
    loaded: bool,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            current: 1,
            total: 1,
            playing: true,
            remainder: 0.0,
            loaded: false,
        }
    }
}

struct NodeData {
    name: String,
    parent: Option<WeakObject>,
    children: Vec<Node>,
    position: Vec2,
    size: Vec2,
    visible: bool,
    button: bool,
    focusable: bool,
    playhead: Playhead,
    frame_actions: BTreeMap<u32, Vec<ActionBuffer>>,
    clip_events: HashMap<String, Vec<ActionBuffer>>,
    invalidated: bool,
    unloaded: bool,
    version: u8,
}

/// Node-specific state attached to a node's object.
pub(crate) struct NodeState {
    data: RwLock<NodeData>,
}

/// Shared handle to an addressable node in the scene tree.
///
/// Every node is also an [`Object`]; its property table holds script
/// variables while name, geometry and timeline live in node state.
#[derive(Clone)]
pub struct Node {
    object: Object,
    state: Arc<NodeState>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        let state = Arc::new(NodeState {
            data: RwLock::new(NodeData {
                name: name.into(),
                parent: None,
                children: Vec::new(),
                position: Vec2::ZERO,
                size: Vec2::ZERO,
                visible: true,
                button: false,
                focusable: false,
                playhead: Playhead::default(),
                frame_actions: BTreeMap::new(),
                clip_events: HashMap::new(),
                invalidated: true,
                unloaded: false,
                version: 7,
            }),
        });
        let object = Object::for_node(Arc::clone(&state));
        Self { object, state }
    }

    pub(crate) fn from_parts(object: Object, state: Arc<NodeState>) -> Self {
        Self { object, state }
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        self.object.ptr_eq(&other.object)
    }

    pub fn name(&self) -> String {
        self.state.data.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.data.write().name = name.into();
    }

    pub fn parent(&self) -> Option<Node> {
        let parent = self.state.data.read().parent.clone()?;
        parent.upgrade().and_then(|object| object.as_node())
    }

    /// Top of this node's ancestor chain.
    pub fn root(&self) -> Node {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// Appends `child` to the display list, detaching it from any previous
    /// parent first.
    pub fn add_child(&self, child: Node) {
        if let Some(previous) = child.parent() {
            previous.detach(&child);
        }
        {
            let mut data = child.state.data.write();
            data.parent = Some(self.object.downgrade());
            data.unloaded = false;
        }
        let mut data = self.state.data.write();
        data.children.push(child);
        data.invalidated = true;
    }

    /// Removes the first child called `name`, marking it unloaded.
    pub fn remove_child(&self, name: &str) -> Option<Node> {
        let child = self.child(name)?;
        self.detach(&child);
        child.state.data.write().unloaded = true;
        Some(child)
    }

    fn detach(&self, child: &Node) {
        let mut data = self.state.data.write();
        data.children.retain(|candidate| !candidate.ptr_eq(child));
        data.invalidated = true;
        drop(data);
        child.state.data.write().parent = None;
    }

    pub fn children(&self) -> Vec<Node> {
        self.state.data.read().children.clone()
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.state
            .data
            .read()
            .children
            .iter()
            .find(|child| child.state.data.read().name == name)
            .cloned()
    }

    /// Resolves one path component relative to this node.
    pub fn get_relative_target(&self, name: &str) -> Option<Node> {
        match name {
            "." | "this" => Some(self.clone()),
            ".." | "_parent" => self.parent(),
            "_root" | "_level0" => Some(self.root()),
            _ => self.child(name),
        }
    }

    /// Scripting version governing property coercions, taken from the root.
    pub fn script_version(&self) -> u8 {
        self.root().state.data.read().version
    }

    pub fn set_script_version(&self, version: u8) {
        self.state.data.write().version = version;
    }

    /// Dot-form target used by node values, e.g. `_level0.menu.button`.
    pub fn target_path(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}.{}", parent.target_path(), self.name()),
            None => "_level0".to_string(),
        }
    }

    /// Slash-form target reported by `_target`, e.g. `/menu/button`.
    pub fn slash_target(&self) -> String {
        match self.parent() {
            Some(parent) if parent.parent().is_some() => {
                format!("{}/{}", parent.slash_target(), self.name())
            }
            Some(_) => format!("/{}", self.name()),
            None => "/".to_string(),
        }
    }

    pub fn get_member(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.builtin_property(name) {
            return Some(value);
        }
        if let Some(value) = self.object.0.members.read().get(name).cloned() {
            return Some(value);
        }
        self.child(name).map(Value::from)
    }

    pub fn set_member(&self, name: &str, value: Value) {
        if self.set_builtin_property(name, &value) {
            return;
        }
        self.object.0.members.write().insert(name, value);
    }

    fn builtin_property(&self, name: &str) -> Option<Value> {
        match name {
            "_target" => return Some(Value::from(self.slash_target())),
            "_parent" => return self.parent().map(Value::from),
            _ => {}
        }
        let data = self.state.data.read();
        let value = match name {
            "_name" => Value::from(data.name.clone()),
            "_currentframe" => Value::from(data.playhead.current),
            "_totalframes" => Value::from(data.playhead.total),
            "_visible" => Value::Bool(data.visible),
            "_x" => Value::Number(f64::from(data.position.x)),
            "_y" => Value::Number(f64::from(data.position.y)),
            "_width" => Value::Number(f64::from(data.size.x)),
            "_height" => Value::Number(f64::from(data.size.y)),
            _ => return None,
        };
        Some(value)
    }

    fn set_builtin_property(&self, name: &str, value: &Value) -> bool {
        let version = self.script_version();
        let mut data = self.state.data.write();
        match name {
            "_name" => data.name = value.to_text(),
            "_visible" => data.visible = value.to_bool(version),
            "_x" | "_y" | "_width" | "_height" => {
                let number = value.to_number(version);
                if number.is_nan() {
                    debug!("ignoring non-numeric assignment to {name}");
                    return true;
                }
                let number = number as f32;
                match name {
                    "_x" => data.position.x = number,
                    "_y" => data.position.y = number,
                    "_width" => data.size.x = number.max(0.0),
                    _ => data.size.y = number.max(0.0),
                }
            }
            "_target" | "_parent" | "_currentframe" | "_totalframes" => {
                debug!("{name} is read-only");
                return true;
            }
            _ => return false,
        }
        data.invalidated = true;
        true
    }

    pub fn position(&self) -> Vec2 {
        self.state.data.read().position
    }

    pub fn set_position(&self, position: Vec2) {
        let mut data = self.state.data.write();
        data.position = position;
        data.invalidated = true;
    }

    pub fn size(&self) -> Vec2 {
        self.state.data.read().size
    }

    pub fn set_size(&self, size: Vec2) {
        let mut data = self.state.data.write();
        data.size = size.max(Vec2::ZERO);
        data.invalidated = true;
    }

    pub fn bounds(&self) -> Rect {
        let data = self.state.data.read();
        Rect::from_origin_size(data.position, data.size)
    }

    pub fn hit_test(&self, point: Vec2) -> bool {
        let bounds = self.bounds();
        !bounds.is_empty() && bounds.contains(point)
    }

    pub fn is_visible(&self) -> bool {
        self.state.data.read().visible
    }

    pub fn set_visible(&self, visible: bool) {
        let mut data = self.state.data.write();
        data.visible = visible;
        data.invalidated = true;
    }

    pub fn is_button(&self) -> bool {
        self.state.data.read().button
    }

    pub fn set_button(&self, button: bool) {
        self.state.data.write().button = button;
    }

    pub fn is_focusable(&self) -> bool {
        self.state.data.read().focusable
    }

    pub fn set_focusable(&self, focusable: bool) {
        self.state.data.write().focusable = focusable;
    }

    pub fn is_unloaded(&self) -> bool {
        self.state.data.read().unloaded
    }

    pub fn is_invalidated(&self) -> bool {
        self.state.data.read().invalidated
    }

    pub fn set_invalidated(&self) {
        self.state.data.write().invalidated = true;
    }

    /// Clears the invalidated flag on this node and all descendants.
    pub fn clear_invalidated(&self) {
        self.state.data.write().invalidated = false;
        for child in self.children() {
            child.clear_invalidated();
        }
    }

    pub fn playhead(&self) -> Playhead {
        self.state.data.read().playhead
    }

    pub fn set_total_frames(&self, total: u32) {
        let mut data = self.state.data.write();
        data.playhead.total = total.max(1);
        data.playhead.current = data.playhead.current.min(data.playhead.total);
    }

    pub fn play(&self) {
        self.state.data.write().playhead.playing = true;
    }

    pub fn stop(&self) {
        self.state.data.write().playhead.playing = false;
    }

    /// Jumps to `frame` (clamped to the timeline) and queues its actions.
    pub fn goto_frame(&self, frame: u32, queue: &ActionQueue) {
        let actions = {
            let mut data = self.state.data.write();
            let frame = frame.clamp(1, data.playhead.total);
            data.playhead.current = frame;
            data.invalidated = true;
            data.frame_actions.get(&frame).cloned().unwrap_or_default()
        };
        for buffer in actions {
            queue.push_code(buffer, self.clone());
        }
    }

    pub fn add_frame_action(&self, frame: u32, buffer: ActionBuffer) {
        self.state
            .data
            .write()
            .frame_actions
            .entry(frame.max(1))
            .or_default()
            .push(buffer);
    }

    /// Registers an action buffer run whenever the named event reaches the
    /// node (`onPress`, `onEnterFrame`, ...).
    pub fn add_clip_event(&self, handler: impl Into<String>, buffer: ActionBuffer) {
        self.state
            .data
            .write()
            .clip_events
            .entry(handler.into())
            .or_default()
            .push(buffer);
    }

    fn clip_event_buffers(&self, handler: &str) -> Vec<ActionBuffer> {
        self.state
            .data
            .read()
            .clip_events
            .get(handler)
            .cloned()
            .unwrap_or_default()
    }

    fn handler_function(&self, event: EventId) -> Option<crate::object::Function> {
        self.object
            .0
            .members
            .read()
            .get(event.handler_name())
            .and_then(Value::as_function)
    }

    /// Whether pointer events should stop at this node.
    pub fn wants_mouse(&self) -> bool {
        if self.is_button() {
            return true;
        }
        EventId::BUTTON_EVENTS.iter().any(|event| {
            self.handler_function(*event).is_some()
                || !self.clip_event_buffers(event.handler_name()).is_empty()
        })
    }

    /// Deepest visible node under `point` that accepts pointer events;
    /// later children sit on top of earlier ones.
    pub fn topmost_at(&self, point: Vec2) -> Option<Node> {
        if !self.is_visible() {
            return None;
        }
        for child in self.children().into_iter().rev() {
            if let Some(hit) = child.topmost_at(point) {
                return Some(hit);
            }
        }
        (self.wants_mouse() && self.hit_test(point)).then(|| self.clone())
    }

    /// Delivers an event to this node and reports whether it was handled.
    ///
    /// A member function named after the event runs immediately with the
    /// node as `this`; clip-event buffers are queued for the next drain.
    /// Focus requests are also accepted by focusable nodes.
    pub fn on_event(&self, env: &mut Environment, event: EventId) -> bool {
        let mut handled = false;

        if let Some(function) = self.handler_function(event) {
            function.call(env, Some(&self.object), &event.arguments());
            handled = true;
        }
        for buffer in self.clip_event_buffers(event.handler_name()) {
            env.vm().queue().push_code(buffer, self.clone());
            handled = true;
        }
        if event == EventId::SetFocus && self.is_focusable() {
            handled = true;
        }
        if handled {
            self.set_invalidated();
        }
        handled
    }

    /// Button-style dispatch: buttons count as handling every pointer event
    /// because their appearance changes with state.
    pub fn on_button_event(&self, env: &mut Environment, event: EventId) -> bool {
        let handled = self.on_event(env, event);
        handled || self.is_button()
    }

    /// Queues the event's handlers instead of running them now.
    pub fn queue_event(&self, event: EventId, queue: &ActionQueue) {
        if let Some(function) = self.handler_function(event) {
            queue.push_call(function, event.arguments(), self.clone());
        }
        for buffer in self.clip_event_buffers(event.handler_name()) {
            queue.push_code(buffer, self.clone());
        }
    }

    /// Steps the timeline by `delta` and recurses into children.
    ///
    /// The first advance queues frame 1 actions and `onLoad`; every elapsed
    /// frame then moves the playhead (looping) while playing, queues the
    /// entered frame's actions and an `onEnterFrame` dispatch.
    pub fn advance(&self, delta: Duration, frame_rate: f32, queue: &ActionQueue) {
        let frame_time = 1.0 / frame_rate.max(1.0);
        let (first_load, mut entered, ticks) = {
            let mut data = self.state.data.write();
            let first_load = !data.playhead.loaded;
            let mut entered = Vec::new();
            if first_load {
                data.playhead.loaded = true;
                let current = data.playhead.current;
                entered.extend(data.frame_actions.get(&current).cloned().unwrap_or_default());
            }
            data.playhead.remainder += delta.as_secs_f32();
            let mut ticks = 0;
            while data.playhead.remainder >= frame_time {
                data.playhead.remainder -= frame_time;
                ticks += 1;
                if data.playhead.playing && data.playhead.total > 1 {
                    data.playhead.current = data.playhead.current % data.playhead.total + 1;
                    let current = data.playhead.current;
                    entered.extend(data.frame_actions.get(&current).cloned().unwrap_or_default());
                    data.invalidated = true;
                }
            }
            (first_load, entered, ticks)
        };

        for buffer in entered.drain(..) {
            queue.push_code(buffer, self.clone());
        }
        if first_load {
            self.queue_event(EventId::Load, queue);
        }
        for _ in 0..ticks {
            self.queue_event(EventId::EnterFrame, queue);
        }

        for child in self.children() {
            child.advance(delta, frame_rate, queue);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.target_path()).finish()
    }
}
