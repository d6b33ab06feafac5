//! Per-runtime shared state.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::action::ActionQueue;
use crate::builtins;
use crate::config::PlayerConfig;
use crate::fonts::FontLibrary;
use crate::node::Node;
use crate::object::Object;
use crate::timer::{IntervalTimer, TimerList};

/// Objects registered for a class of events, in registration order and
/// without duplicates.
#[derive(Debug, Default, Clone)]
pub struct ListenerSet {
    listeners: Vec<Object>,
}

impl ListenerSet {
    /// Returns false when the listener was already registered.
    pub fn add(&mut self, listener: Object) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn remove(&mut self, listener: &Object) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|candidate| !candidate.ptr_eq(listener));
        before != self.listeners.len()
    }

    pub fn contains(&self, listener: &Object) -> bool {
        self.listeners.iter().any(|candidate| candidate.ptr_eq(listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.listeners.iter()
    }
}

/// State shared by everything running inside one player instance: the
/// global object, the node tree root, the action queue, timers, listener
/// sets, fonts and the random generator.
pub struct Vm {
    version: u8,
    frame_rate: f32,
    global: Object,
    root: RwLock<Node>,
    queue: ActionQueue,
    timers: Mutex<TimerList>,
    fonts: RwLock<FontLibrary>,
    rng: Mutex<StdRng>,
    mouse_listeners: Mutex<ListenerSet>,
    keypress_listeners: Mutex<ListenerSet>,
    trace_output: Mutex<Vec<String>>,
}

impl Vm {
    pub fn new(config: &PlayerConfig, root: Node) -> Arc<Self> {
        root.set_script_version(config.version);
        let vm = Self {
            version: config.version,
            frame_rate: config.frame_rate,
            global: Object::new(),
            root: RwLock::new(root),
            queue: ActionQueue::new(),
            timers: Mutex::new(TimerList::new()),
            fonts: RwLock::new(FontLibrary::new()),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            mouse_listeners: Mutex::new(ListenerSet::default()),
            keypress_listeners: Mutex::new(ListenerSet::default()),
            trace_output: Mutex::new(Vec::new()),
        };
        builtins::install(&vm.global);
        Arc::new(vm)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn global(&self) -> &Object {
        &self.global
    }

    pub fn root(&self) -> Node {
        self.root.read().clone()
    }

    /// Replaces the root node. Scripts may do this mid-frame.
    pub fn set_root(&self, root: Node) {
        root.set_invalidated();
        root.set_script_version(self.version);
        *self.root.write() = root;
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn timers(&self) -> &Mutex<TimerList> {
        &self.timers
    }

    pub fn add_interval_timer(&self, timer: IntervalTimer) -> u32 {
        let id = self.timers.lock().add(timer);
        debug!("registered interval timer {id}");
        id
    }

    pub fn clear_interval_timer(&self, id: u32) -> bool {
        self.timers.lock().clear(id)
    }

    pub fn fonts(&self) -> &RwLock<FontLibrary> {
        &self.fonts
    }

    /// Steps the shared generator without using the result.
    pub fn next_random(&self) -> u32 {
        self.rng.lock().next_u32()
    }

    /// Uniform integer in `0..bound`; zero when `bound` is zero.
    pub fn random_below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..bound)
    }

    pub fn add_mouse_listener(&self, listener: Object) -> bool {
        self.mouse_listeners.lock().add(listener)
    }

    pub fn remove_mouse_listener(&self, listener: &Object) -> bool {
        self.mouse_listeners.lock().remove(listener)
    }

    /// Copy of the mouse listeners, safe to iterate while callbacks
    /// register or drop listeners.
    pub fn mouse_listeners(&self) -> ListenerSet {
        self.mouse_listeners.lock().clone()
    }

    pub fn add_keypress_listener(&self, listener: Object) -> bool {
        self.keypress_listeners.lock().add(listener)
    }

    pub fn remove_keypress_listener(&self, listener: &Object) -> bool {
        self.keypress_listeners.lock().remove(listener)
    }

    pub fn keypress_listeners(&self) -> ListenerSet {
        self.keypress_listeners.lock().clone()
    }

    pub fn trace(&self, line: String) {
        info!("trace: {line}");
        self.trace_output.lock().push(line);
    }

    /// Drains the lines printed by `trace` so far.
    pub fn take_trace_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.trace_output.lock())
    }
}
