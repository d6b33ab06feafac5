//! Top-level driver: timers, the action queue, listeners and the pointer
//! state machine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use log::{debug, error};

use crate::action::{ActionExecutor, ActionItem};
use crate::config::PlayerConfig;
use crate::environment::Environment;
use crate::event::EventId;
use crate::input::{ButtonState, InputState, KeyCode, PointerState};
use crate::node::{Node, Rect};
use crate::object::Object;
use crate::render::{self, Canvas, Viewport};
use crate::timer::IntervalTimer;
use crate::value::Value;
use crate::vm::{ListenerSet, Vm};

/// Drag-and-drop record set by scripts and consulted on pointer movement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DragState {
    pub target: Option<Node>,
    /// Centre the node under the cursor instead of keeping the grab offset.
    pub lock_center: bool,
    /// Limits for the node's position while dragging.
    pub bounds: Option<Rect>,
}

pub struct Stage {
    vm: Arc<Vm>,
    config: PlayerConfig,
    executor: Box<dyn ActionExecutor>,
    input: InputState,
    pointer: PointerState,
    focus: Option<Node>,
    drag: DragState,
    drag_offset: Vec2,
    viewport: Viewport,
}

impl Stage {
    pub fn new(config: PlayerConfig, root: Node, executor: Box<dyn ActionExecutor>) -> Self {
        root.set_invalidated();
        let vm = Vm::new(&config, root);
        let viewport = Viewport::new(0.0, 0.0, config.stage_size.x, config.stage_size.y);
        Self {
            vm,
            config,
            executor,
            input: InputState::new(),
            pointer: PointerState::default(),
            focus: None,
            drag: DragState::default(),
            drag_offset: Vec2::ZERO,
            viewport,
        }
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn root(&self) -> Node {
        self.vm.root()
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    /// Node currently holding keyboard focus.
    pub fn focus(&self) -> Option<&Node> {
        self.focus.as_ref()
    }

    fn environment(&self, target: Node) -> Environment {
        Environment::new(Arc::clone(&self.vm), target)
    }

    /// Runs one tick: due timers, the random generator, the node timeline
    /// and then every queued action, including ones queued while draining.
    pub fn advance(&mut self, delta: Duration) {
        self.run_timers(delta);
        self.vm.next_random();

        // Actions may detach or replace the root; hold it until the tick ends.
        let root = self.vm.root();
        root.advance(delta, self.vm.frame_rate(), self.vm.queue());
        self.process_action_queue();
        drop(root);
    }

    fn run_timers(&mut self, delta: Duration) {
        let count = {
            let mut timers = self.vm.timers().lock();
            timers.advance_clock(delta);
            timers.len()
        };
        for index in 0..count {
            // Polled one at a time so a callback can clear a later timer.
            let Some(call) = self.vm.timers().lock().poll(index) else {
                continue;
            };
            let target = call
                .this
                .as_ref()
                .and_then(Object::as_node)
                .unwrap_or_else(|| self.vm.root());
            let mut env = self.environment(target);
            call.function.call(&mut env, call.this.as_ref(), &call.args);
        }
    }

    /// Executes queued items until the queue is empty.
    pub fn process_action_queue(&mut self) {
        while let Some(item) = self.vm.queue().pop() {
            let target = item.target().clone();
            if target.is_unloaded() {
                debug!("skipping {} queued for unloaded {:?}", item.label(), target);
                continue;
            }
            let mut env = self.environment(target.clone());
            match item {
                ActionItem::Code { buffer, .. } => {
                    if let Err(err) = self.executor.execute(&buffer, &mut env) {
                        error!("action {} on {} failed: {err:#}", buffer.label(), target.target_path());
                    }
                }
                ActionItem::Call { function, args, .. } => {
                    function.call(&mut env, Some(target.object()), &args);
                }
            }
        }
    }

    /// Hands the frame to `canvas`. Hidden roots and empty stages draw
    /// nothing.
    pub fn display(&mut self, canvas: &mut dyn Canvas) {
        let root = self.vm.root();
        root.clear_invalidated();
        if !root.is_visible() {
            return;
        }
        let frame = Rect::new(Vec2::ZERO, self.config.stage_size);
        if frame.is_empty() {
            return;
        }
        canvas.begin_display(self.config.background, self.viewport, frame);
        render::draw_tree(canvas, &root, 0);
        canvas.end_display();
    }

    pub fn set_display_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.viewport = Viewport::new(x, y, width, height);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn pixel_scale(&self) -> f32 {
        self.viewport
            .pixel_scale(Rect::new(Vec2::ZERO, self.config.stage_size))
    }

    pub fn notify_mouse_moved(&mut self, x: f32, y: f32) -> bool {
        self.input.set_mouse_position(Vec2::new(x, y));
        let mut redraw = self.notify_mouse_listeners(EventId::MouseMove);
        redraw |= self.update_drag();
        redraw |= self.fire_mouse_event();
        self.process_action_queue();
        redraw
    }

    pub fn notify_mouse_clicked(&mut self, pressed: bool, mask: u32) -> bool {
        let mut redraw = if pressed {
            self.input.press_buttons(mask);
            self.notify_mouse_listeners(EventId::MouseDown)
        } else {
            self.input.release_buttons(mask);
            self.notify_mouse_listeners(EventId::MouseUp)
        };
        redraw |= self.fire_mouse_event();
        self.process_action_queue();
        redraw
    }

    /// Sets cursor position and button mask at once; no listeners run.
    pub fn notify_mouse_state(&mut self, x: f32, y: f32, buttons: u32) -> bool {
        self.input.set_mouse_position(Vec2::new(x, y));
        self.input.set_buttons(buttons);
        let mut redraw = self.update_drag();
        redraw |= self.fire_mouse_event();
        self.process_action_queue();
        redraw
    }

    pub fn notify_key_pressed(&mut self, key: KeyCode) -> bool {
        self.input.set_key_down(key);
        let listeners = self.vm.keypress_listeners();
        let redraw = self.dispatch(&listeners, EventId::KeyPress(key));
        self.process_action_queue();
        redraw
    }

    pub fn notify_key_released(&mut self, key: KeyCode) {
        self.input.set_key_up(key);
    }

    fn notify_mouse_listeners(&mut self, event: EventId) -> bool {
        let listeners = self.vm.mouse_listeners();
        self.dispatch(&listeners, event)
    }

    /// Nodes receive the event like any other; plain objects get their
    /// handler method called directly.
    fn dispatch(&mut self, listeners: &ListenerSet, event: EventId) -> bool {
        let mut handled = false;
        for listener in listeners.iter() {
            match listener.as_node() {
                Some(node) => {
                    let mut env = self.environment(node.clone());
                    handled |= node.on_event(&mut env, event);
                }
                None => {
                    let Some(handler) = listener
                        .get_member(event.handler_name())
                        .and_then(|value| value.as_function())
                    else {
                        continue;
                    };
                    let mut env = self.environment(self.vm.root());
                    handler.call(&mut env, Some(listener), &event.arguments());
                    handled = true;
                }
            }
        }
        handled
    }

    fn fire_mouse_event(&mut self) -> bool {
        let position = self.input.mouse_position();
        self.pointer.topmost = self.vm.root().topmost_at(position);
        self.pointer.current = ButtonState::from_mask(self.input.buttons());
        self.generate_mouse_button_events()
    }

    fn fire(&self, node: &Node, event: EventId) -> bool {
        let mut env = self.environment(node.clone());
        node.on_button_event(&mut env, event)
    }

    fn generate_mouse_button_events(&mut self) -> bool {
        let mut active = self.pointer.active.clone();
        let topmost = self.pointer.topmost.clone();
        let mut redraw = false;

        if self.pointer.last == ButtonState::Down {
            if !self.pointer.inside_active {
                if topmost == active {
                    if let Some(node) = &active {
                        redraw |= self.fire(node, EventId::DragOver);
                    }
                    self.pointer.inside_active = true;
                }
            } else if topmost != active {
                if let Some(node) = &active {
                    redraw |= self.fire(node, EventId::DragOut);
                }
                self.pointer.inside_active = false;
            }

            if self.pointer.current == ButtonState::Up {
                self.pointer.last = ButtonState::Up;
                if let Some(node) = &active {
                    let event = if self.pointer.inside_active {
                        EventId::Release
                    } else {
                        EventId::ReleaseOutside
                    };
                    redraw |= self.fire(node, event);
                }
            }
        }

        if self.pointer.last == ButtonState::Up {
            if topmost != active {
                if let Some(node) = &active {
                    redraw |= self.fire(node, EventId::RollOut);
                }
                active = topmost.clone();
                if let Some(node) = &active {
                    redraw |= self.fire(node, EventId::RollOver);
                }
                self.pointer.inside_active = true;
            }

            if self.pointer.current == ButtonState::Down {
                if self.focus != active {
                    if let Some(focused) = self.focus.take() {
                        let mut env = self.environment(focused.clone());
                        focused.on_event(&mut env, EventId::KillFocus);
                        redraw = true;
                    }
                    if let Some(node) = &active {
                        let mut env = self.environment(node.clone());
                        if node.on_event(&mut env, EventId::SetFocus) {
                            self.focus = Some(node.clone());
                        }
                    }
                }
                if let Some(node) = &active {
                    redraw |= self.fire(node, EventId::Press);
                }
                self.pointer.inside_active = true;
                self.pointer.last = ButtonState::Down;
            }
        }

        self.pointer.active = active;
        self.pointer.topmost = topmost;
        redraw
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    /// Starts or stops a drag. The grab offset is captured now so the node
    /// keeps its position relative to the cursor.
    pub fn set_drag_state(&mut self, state: DragState) {
        self.drag_offset = state
            .target
            .as_ref()
            .map_or(Vec2::ZERO, |node| self.input.mouse_position() - node.position());
        self.drag = state;
    }

    fn update_drag(&mut self) -> bool {
        let Some(target) = self.drag.target.clone() else {
            return false;
        };
        let cursor = self.input.mouse_position();
        let mut position = if self.drag.lock_center {
            cursor - target.size() * 0.5
        } else {
            cursor - self.drag_offset
        };
        if let Some(bounds) = self.drag.bounds {
            position = position.max(bounds.min).min(bounds.max);
        }
        if position == target.position() {
            return false;
        }
        target.set_position(position);
        true
    }

    pub fn add_mouse_listener(&self, listener: Object) -> bool {
        self.vm.add_mouse_listener(listener)
    }

    pub fn remove_mouse_listener(&self, listener: &Object) -> bool {
        self.vm.remove_mouse_listener(listener)
    }

    pub fn add_keypress_listener(&self, listener: Object) -> bool {
        self.vm.add_keypress_listener(listener)
    }

    pub fn remove_keypress_listener(&self, listener: &Object) -> bool {
        self.vm.remove_keypress_listener(listener)
    }

    pub fn add_interval_timer(&self, timer: IntervalTimer) -> u32 {
        self.vm.add_interval_timer(timer)
    }

    pub fn clear_interval_timer(&self, id: u32) -> bool {
        self.vm.clear_interval_timer(id)
    }

    /// Calls a method defined on the root node and returns its result.
    pub fn call_method(&mut self, name: &str, args: &[Value]) -> Value {
        let root = self.vm.root();
        let Some(method) = root.get_member(name).and_then(|value| value.as_function()) else {
            debug!("call_method('{name}'): no such method on the root");
            return Value::Undefined;
        };
        let mut env = self.environment(root.clone());
        let result = method.call(&mut env, Some(root.object()), args);
        self.process_action_queue();
        result
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("config", &self.config)
            .field("root", &self.vm.root())
            .field("pointer", &self.pointer)
            .field("focus", &self.focus)
            .field("drag", &self.drag)
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionBuffer;
    use crate::input::NamedKey;
    use crate::object::Function;
    use glam::Vec3;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every executed buffer; a buffer whose source reads
    /// `queue <label>` enqueues another buffer on the same target.
    struct Recording {
        log: Log,
    }

    impl ActionExecutor for Recording {
        fn execute(&mut self, buffer: &ActionBuffer, env: &mut Environment) -> anyhow::Result<()> {
            self.log
                .lock()
                .push(format!("{}@{}", buffer.label(), env.target().name()));
            match buffer.as_source() {
                Some("fail") => anyhow::bail!("scripted failure"),
                Some(source) => {
                    if let Some(next) = source.strip_prefix("queue ") {
                        let buffer = ActionBuffer::from_source(next, "");
                        env.vm().queue().push_code(buffer, env.target().clone());
                    }
                    if source == "replace root" {
                        env.vm().set_root(Node::new("_level0"));
                    }
                    Ok(())
                }
                None => Ok(()),
            }
        }
    }

    fn stage_with(root: Node) -> (Stage, Log) {
        let log = Log::default();
        let executor = Recording { log: Arc::clone(&log) };
        let config = PlayerConfig {
            frame_rate: 10.0,
            ..PlayerConfig::default()
        };
        (Stage::new(config, root, Box::new(executor)), log)
    }

    fn recorder(log: &Log, entry: &str) -> Value {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        Value::from(Function::native(move |_, _| {
            log.lock().push(entry.clone());
            Value::Undefined
        }))
    }

    fn square(name: &str, x: f32) -> Node {
        let node = Node::new(name);
        node.set_position(Vec2::new(x, 0.0));
        node.set_size(Vec2::splat(10.0));
        node
    }

    #[test]
    fn actions_queued_while_draining_run_in_the_same_advance() {
        let root = Node::new("_level0");
        root.add_frame_action(1, ActionBuffer::from_source("a", "queue b"));
        root.add_frame_action(1, ActionBuffer::from_source("c", "fail"));
        let (mut stage, log) = stage_with(root);

        stage.advance(Duration::from_millis(10));
        assert_eq!(*log.lock(), vec!["a@_level0", "c@_level0", "b@_level0"]);
        assert!(stage.vm().queue().is_empty());
    }

    #[test]
    fn debug_output_shows_the_root() {
        let (stage, _log) = stage_with(Node::new("_level0"));
        let text = format!("{stage:?}");
        assert!(text.starts_with("Stage {"));
        assert!(text.contains("Node(\"_level0\")"));
    }

    #[test]
    fn root_replaced_mid_advance_stays_alive() {
        let root = Node::new("_level0");
        root.add_frame_action(1, ActionBuffer::from_source("swap", "replace root"));
        let child = Node::new("child");
        child.add_frame_action(1, ActionBuffer::from_source("late", ""));
        root.add_child(child);
        let (mut stage, log) = stage_with(root.clone());

        stage.advance(Duration::from_millis(10));
        assert_eq!(*log.lock(), vec!["swap@_level0", "late@child"]);
        assert!(!stage.root().ptr_eq(&root));
    }

    #[test]
    fn timers_fire_when_due_and_stop_after_clearing() {
        let (mut stage, log) = stage_with(Node::new("_level0"));
        let tick = recorder(&log, "tick").as_function().unwrap();
        let id = stage.add_interval_timer(IntervalTimer::new(tick, Duration::from_millis(150)));
        assert_eq!(id, 1);

        for _ in 0..3 {
            stage.advance(Duration::from_millis(100));
        }
        assert_eq!(log.lock().len(), 1);

        assert!(stage.clear_interval_timer(id));
        assert!(stage.clear_interval_timer(id));
        assert!(!stage.clear_interval_timer(7));
        for _ in 0..5 {
            stage.advance(Duration::from_millis(100));
        }
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn timer_cleared_by_an_earlier_callback_does_not_fire() {
        let (mut stage, log) = stage_with(Node::new("_level0"));
        let clear_next = Function::native(|env, _| {
            env.vm().clear_interval_timer(2);
            Value::Undefined
        });
        stage.add_interval_timer(IntervalTimer::new(clear_next, Duration::from_millis(10)));
        let second = recorder(&log, "second").as_function().unwrap();
        stage.add_interval_timer(IntervalTimer::new(second, Duration::from_millis(10)));

        stage.advance(Duration::from_millis(20));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn pressing_moves_focus_in_order() {
        let root = Node::new("_level0");
        let (mut stage, log) = stage_with(root.clone());
        let y = square("y", 0.0);
        let x = square("x", 50.0);
        for node in [&y, &x] {
            node.set_focusable(true);
            let name = node.name();
            for handler in ["onSetFocus", "onKillFocus", "onPress"] {
                node.set_member(handler, recorder(&log, &format!("{name}.{handler}")));
            }
            root.add_child(node.clone());
        }

        stage.notify_mouse_moved(5.0, 5.0);
        stage.notify_mouse_clicked(true, 1);
        stage.notify_mouse_clicked(false, 1);
        assert_eq!(stage.focus(), Some(&y));

        stage.notify_mouse_moved(55.0, 5.0);
        stage.notify_mouse_clicked(true, 1);
        assert_eq!(
            *log.lock(),
            vec!["y.onSetFocus", "y.onPress", "y.onKillFocus", "x.onSetFocus", "x.onPress"]
        );
        assert_eq!(stage.focus(), Some(&x));
    }

    #[test]
    fn refused_focus_leaves_nothing_focused() {
        let root = Node::new("_level0");
        let (mut stage, _log) = stage_with(root.clone());
        let field = square("field", 0.0);
        field.set_focusable(true);
        field.set_button(true);
        let button = square("button", 50.0);
        button.set_button(true);
        root.add_child(field.clone());
        root.add_child(button);

        stage.notify_mouse_state(5.0, 5.0, 1);
        assert_eq!(stage.focus(), Some(&field));
        stage.notify_mouse_state(5.0, 5.0, 0);
        stage.notify_mouse_state(55.0, 5.0, 0);
        stage.notify_mouse_state(55.0, 5.0, 1);
        assert_eq!(stage.focus(), None);
    }

    #[test]
    fn drag_out_over_and_release_outside() {
        let root = Node::new("_level0");
        let (mut stage, log) = stage_with(root.clone());
        let button = square("button", 0.0);
        for handler in ["onPress", "onDragOut", "onDragOver", "onReleaseOutside", "onRelease", "onRollOut"] {
            button.set_member(handler, recorder(&log, handler));
        }
        root.add_child(button);

        stage.notify_mouse_moved(5.0, 5.0);
        stage.notify_mouse_clicked(true, 1);
        stage.notify_mouse_moved(100.0, 100.0);
        stage.notify_mouse_moved(5.0, 5.0);
        stage.notify_mouse_moved(100.0, 100.0);
        stage.notify_mouse_clicked(false, 1);

        assert_eq!(
            *log.lock(),
            vec!["onPress", "onDragOut", "onDragOver", "onDragOut", "onReleaseOutside", "onRollOut"]
        );
        assert!(stage.pointer().active.is_none());
    }

    #[test]
    fn redraw_reported_only_for_handled_events() {
        let root = Node::new("_level0");
        let (mut stage, _log) = stage_with(root.clone());
        let button = square("button", 0.0);
        button.set_button(true);
        root.add_child(button.clone());

        assert!(!stage.notify_mouse_moved(100.0, 100.0));
        assert!(stage.notify_mouse_moved(5.0, 5.0));
        assert_eq!(stage.pointer().active, Some(button));
        assert!(!stage.notify_mouse_moved(6.0, 6.0));
    }

    #[test]
    fn listeners_receive_mouse_and_key_events() {
        let (mut stage, log) = stage_with(Node::new("_level0"));
        let listener = Object::new();
        listener.set_member("onMouseDown", recorder(&log, "down"));
        let key_seen = Log::default();
        let key_sink = Arc::clone(&key_seen);
        listener.set_member(
            "onKeyDown",
            Function::native(move |_, call| {
                key_sink.lock().push(call.arg(0).to_text());
                Value::Undefined
            })
            .into(),
        );
        assert!(stage.add_mouse_listener(listener.clone()));
        assert!(stage.add_keypress_listener(listener.clone()));

        assert!(stage.notify_mouse_clicked(true, 1));
        assert!(stage.notify_key_pressed(KeyCode::Named(NamedKey::Space)));
        assert_eq!(*log.lock(), vec!["down"]);
        assert_eq!(*key_seen.lock(), vec!["32"]);

        assert!(stage.remove_mouse_listener(&listener));
        stage.notify_mouse_clicked(false, 1);
        stage.notify_mouse_clicked(true, 1);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn dragging_repositions_within_bounds() {
        let root = Node::new("_level0");
        let (mut stage, _log) = stage_with(root.clone());
        let piece = square("piece", 0.0);
        root.add_child(piece.clone());

        stage.notify_mouse_moved(4.0, 4.0);
        let state = DragState {
            target: Some(piece.clone()),
            lock_center: false,
            bounds: Some(Rect::new(Vec2::ZERO, Vec2::new(50.0, 20.0))),
        };
        stage.set_drag_state(state.clone());
        assert_eq!(stage.drag_state(), &state);

        stage.notify_mouse_moved(24.0, 14.0);
        assert_eq!(piece.position(), Vec2::new(20.0, 10.0));
        stage.notify_mouse_moved(200.0, 200.0);
        assert_eq!(piece.position(), Vec2::new(50.0, 20.0));

        stage.set_drag_state(DragState {
            target: Some(piece.clone()),
            lock_center: true,
            bounds: None,
        });
        stage.notify_mouse_moved(30.0, 30.0);
        assert_eq!(piece.position(), Vec2::new(25.0, 25.0));

        stage.set_drag_state(DragState::default());
        stage.notify_mouse_moved(0.0, 0.0);
        assert_eq!(piece.position(), Vec2::new(25.0, 25.0));
    }

    struct Frames {
        begun: usize,
        drawn: Vec<String>,
    }

    impl Canvas for Frames {
        fn begin_display(&mut self, background: Vec3, _: Viewport, frame: Rect) {
            assert_eq!(background, Vec3::ONE);
            assert_eq!(frame.max, Vec2::new(550.0, 400.0));
            self.begun += 1;
        }

        fn draw_node(&mut self, node: &Node, _: usize) {
            self.drawn.push(node.name());
        }

        fn end_display(&mut self) {}
    }

    #[test]
    fn display_clears_invalidation_and_skips_hidden_root() {
        let root = Node::new("_level0");
        root.add_child(Node::new("clip"));
        let (mut stage, _log) = stage_with(root.clone());
        let mut canvas = Frames {
            begun: 0,
            drawn: Vec::new(),
        };

        stage.display(&mut canvas);
        assert_eq!(canvas.drawn, vec!["_level0", "clip"]);
        assert!(!root.is_invalidated());

        root.set_visible(false);
        stage.display(&mut canvas);
        assert_eq!(canvas.begun, 1);
        assert!(!root.is_invalidated());
    }

    #[test]
    fn call_method_invokes_root_functions() {
        let root = Node::new("_level0");
        let (mut stage, _log) = stage_with(root.clone());
        root.set_member(
            "sum",
            Function::with_params(&["a", "b"], 0, |env, _| {
                let a = env.get_variable("a", &[]).to_number(7);
                let b = env.get_variable("b", &[]).to_number(7);
                Value::Number(a + b)
            })
            .into(),
        );
        let result = stage.call_method("sum", &[Value::Number(2.0), Value::from("3")]);
        assert!(result.strictly_equals(&Value::Number(5.0)));
        assert!(stage.call_method("missing", &[]).is_undefined());
    }
}
