//! Pointer/touch interaction registry
//!
//! One registry is owned by the host and shared by every mounted surface.
//! Input arrives in client coordinates; each event is tested against every
//! registered surface's bounding rectangle and the per-surface state machine
//! fires enter/move/click/leave accordingly.
//!
//! Global input listeners are a reference-counted resource: the
//! [`ListenerHost`] is attached when the first surface registers and
//! detached when the last one leaves.

use std::collections::BTreeMap;

use glam::Vec2;

/// Axis-aligned client-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Inclusive on every edge
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}

/// Per-surface pointer state handed to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerState {
    /// Position relative to the surface's top-left corner
    pub position: Vec2,
    /// Normalized device coordinates, +Y up, [-1, 1] inside the surface
    pub n_position: Vec2,
    pub hover: bool,
    pub touching: bool,
}

impl PointerState {
    fn track(&mut self, point: Vec2, rect: &Rect) {
        self.position = Vec2::new(point.x - rect.left, point.y - rect.top);
        let w = if rect.width > 0.0 { rect.width } else { 1.0 };
        let h = if rect.height > 0.0 { rect.height } else { 1.0 };
        self.n_position = Vec2::new(
            (self.position.x / w) * 2.0 - 1.0,
            (-self.position.y / h) * 2.0 + 1.0,
        );
    }
}

/// A registered surface: where it is and what it wants to hear
pub trait InteractionTarget {
    /// Current bounding rectangle in client coordinates
    fn bounding_rect(&self) -> Rect;
    fn on_enter(&mut self, _state: &PointerState) {}
    fn on_move(&mut self, _state: &PointerState) {}
    fn on_click(&mut self, _state: &PointerState) {}
    fn on_leave(&mut self, _state: &PointerState) {}
}

/// Owner of the global (document-level) input listeners
pub trait ListenerHost {
    fn attach(&mut self);
    fn detach(&mut self);
}

/// Host that installs nothing; for headless use and tests
#[derive(Debug, Default)]
pub struct NoListeners;

impl ListenerHost for NoListeners {
    fn attach(&mut self) {}
    fn detach(&mut self) {}
}

/// Registration key returned by [`InteractionRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(u64);

struct Entry {
    state: PointerState,
    target: Box<dyn InteractionTarget>,
}

/// Surface-keyed pointer state machine
pub struct InteractionRegistry {
    entries: BTreeMap<SurfaceId, Entry>,
    next_id: u64,
    listeners: Box<dyn ListenerHost>,
    attached: bool,
    /// Last pointer position in client coordinates
    pointer: Vec2,
}

impl InteractionRegistry {
    pub fn new(listeners: Box<dyn ListenerHost>) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
            listeners,
            attached: false,
            pointer: Vec2::ZERO,
        }
    }

    /// Registry without global listeners
    pub fn headless() -> Self {
        Self::new(Box::new(NoListeners))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the global listeners are currently installed
    pub fn listening(&self) -> bool {
        self.attached
    }

    pub fn state(&self, id: SurfaceId) -> Option<&PointerState> {
        self.entries.get(&id).map(|e| &e.state)
    }

    pub fn register(&mut self, target: Box<dyn InteractionTarget>) -> SurfaceId {
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                state: PointerState::default(),
                target,
            },
        );
        if !self.attached {
            self.listeners.attach();
            self.attached = true;
            log::debug!("Interaction listeners attached");
        }
        id
    }

    /// Remove a surface. Unknown or already-removed ids are ignored.
    pub fn unregister(&mut self, id: SurfaceId) -> bool {
        if self.entries.remove(&id).is_none() {
            return false;
        }
        if self.entries.is_empty() && self.attached {
            self.listeners.detach();
            self.attached = false;
            log::debug!("Interaction listeners detached");
        }
        true
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.pointer = Vec2::new(x, y);
        let point = self.pointer;
        for entry in self.entries.values_mut() {
            let rect = entry.target.bounding_rect();
            if rect.contains(point) {
                entry.state.track(point, &rect);
                if !entry.state.hover {
                    entry.state.hover = true;
                    entry.target.on_enter(&entry.state);
                }
                entry.target.on_move(&entry.state);
            } else if entry.state.hover && !entry.state.touching {
                entry.state.hover = false;
                entry.target.on_leave(&entry.state);
            }
        }
    }

    /// Pointer left the document: every hovered surface leaves
    pub fn pointer_leave(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.state.hover {
                entry.state.hover = false;
                entry.target.on_leave(&entry.state);
            }
        }
    }

    pub fn click(&mut self, x: f32, y: f32) {
        self.pointer = Vec2::new(x, y);
        let point = self.pointer;
        for entry in self.entries.values_mut() {
            let rect = entry.target.bounding_rect();
            entry.state.track(point, &rect);
            if rect.contains(point) {
                entry.target.on_click(&entry.state);
            }
        }
    }

    /// First touch point went down.
    ///
    /// Returns whether the platform default should be suppressed: true
    /// unless the touch began on an interactive control.
    pub fn touch_start(&mut self, x: f32, y: f32, on_control: bool) -> bool {
        self.pointer = Vec2::new(x, y);
        let point = self.pointer;
        for entry in self.entries.values_mut() {
            let rect = entry.target.bounding_rect();
            if rect.contains(point) {
                entry.state.touching = true;
                entry.state.track(point, &rect);
                if !entry.state.hover {
                    entry.state.hover = true;
                    entry.target.on_enter(&entry.state);
                }
                entry.target.on_move(&entry.state);
            }
        }
        !on_control
    }

    /// A drag keeps feeding `move` to a touched surface even outside its rect.
    pub fn touch_move(&mut self, x: f32, y: f32) {
        self.pointer = Vec2::new(x, y);
        let point = self.pointer;
        for entry in self.entries.values_mut() {
            let rect = entry.target.bounding_rect();
            entry.state.track(point, &rect);
            if rect.contains(point) {
                if !entry.state.hover {
                    entry.state.hover = true;
                    entry.state.touching = true;
                    entry.target.on_enter(&entry.state);
                }
                entry.target.on_move(&entry.state);
            } else if entry.state.hover && entry.state.touching {
                entry.target.on_move(&entry.state);
            }
        }
    }

    /// Touch end or cancel
    pub fn touch_end(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.state.touching {
                entry.state.touching = false;
                if entry.state.hover {
                    entry.state.hover = false;
                    entry.target.on_leave(&entry.state);
                }
            }
        }
    }
}

impl Drop for InteractionRegistry {
    fn drop(&mut self) {
        if self.attached {
            self.listeners.detach();
            self.attached = false;
        }
    }
}
