//! Browser host: canvas mounting, observers, listeners and the frame loop

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Element, EventTarget, HtmlCanvasElement, IntersectionObserver,
    IntersectionObserverEntry, MouseEvent, ResizeObserver, TouchEvent,
};

use crate::ballpit::{BallpitError, BallpitPointer, BallpitSurface};
use crate::config::{BallpitConfig, ConfigError, SizeMode, SurfaceOptions};
use crate::consts::RESIZE_DEBOUNCE_MS;
use crate::interaction::{InteractionRegistry, ListenerHost, Rect, SurfaceId};
use crate::renderer::pipeline::SCATTERING_BINDING;
use crate::renderer::{RenderError, ScatteringExtension, WgpuBackend};
use crate::surface::HostMetrics;

type Listener = Closure<dyn FnMut(web_sys::Event)>;
type ObserverCallback = Closure<dyn FnMut(js_sys::Array)>;

/// Install the panic hook and console logger once
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // Already initialized when several surfaces mount
    let _ = console_log::init_with_level(log::Level::Info);
}

fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map_or_else(js_sys::Date::now, |p| p.now())
}

// ============================================================================
// SHARED INTERACTION REGISTRY
// ============================================================================

thread_local! {
    static REGISTRY: RefCell<Weak<RefCell<InteractionRegistry>>> = RefCell::new(Weak::new());
}

/// The registry shared by every mounted surface on the page
fn shared_registry() -> Rc<RefCell<InteractionRegistry>> {
    REGISTRY.with(|slot| {
        let existing = slot.borrow().upgrade();
        if let Some(registry) = existing {
            return registry;
        }
        let registry = Rc::new_cyclic(|weak: &Weak<RefCell<InteractionRegistry>>| {
            RefCell::new(InteractionRegistry::new(Box::new(BodyListeners::new(weak.clone()))))
        });
        *slot.borrow_mut() = Rc::downgrade(&registry);
        registry
    })
}

/// Pointer and touch listeners on `document.body`
struct BodyListeners {
    registry: Weak<RefCell<InteractionRegistry>>,
    installed: Vec<(&'static str, Listener)>,
}

fn first_touch(event: &web_sys::Event) -> Option<(f32, f32)> {
    let touch = event.dyn_ref::<TouchEvent>()?.touches().get(0)?;
    Some((touch.client_x() as f32, touch.client_y() as f32))
}

fn client_point(event: &web_sys::Event) -> Option<(f32, f32)> {
    let event = event.dyn_ref::<MouseEvent>()?;
    Some((event.client_x() as f32, event.client_y() as f32))
}

/// Touches on buttons and links keep their default behavior
fn on_control(event: &web_sys::Event) -> bool {
    let Some(element) = event.target().and_then(|t| t.dyn_into::<Element>().ok()) else {
        return false;
    };
    ["button", "a"]
        .iter()
        .any(|selector| matches!(element.closest(selector), Ok(Some(_))))
}

impl BodyListeners {
    fn new(registry: Weak<RefCell<InteractionRegistry>>) -> Self {
        Self {
            registry,
            installed: Vec::new(),
        }
    }

    fn listener(&self, handler: fn(&mut InteractionRegistry, &web_sys::Event)) -> Listener {
        let registry = self.registry.clone();
        Closure::<dyn FnMut(_)>::new(move |event: web_sys::Event| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if let Ok(mut registry) = registry.try_borrow_mut() {
                handler(&mut registry, &event);
            }
        })
    }
}

impl ListenerHost for BodyListeners {
    fn attach(&mut self) {
        let Some(body) = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.body())
        else {
            log::error!("No document body for interaction listeners");
            return;
        };

        let handlers: [(&'static str, fn(&mut InteractionRegistry, &web_sys::Event)); 7] = [
            ("pointermove", |r, e| {
                if let Some((x, y)) = client_point(e) {
                    r.pointer_move(x, y);
                }
            }),
            ("pointerleave", |r, _| r.pointer_leave()),
            ("click", |r, e| {
                if let Some((x, y)) = client_point(e) {
                    r.click(x, y);
                }
            }),
            ("touchstart", |r, e| {
                if let Some((x, y)) = first_touch(e) {
                    if r.touch_start(x, y, on_control(e)) {
                        e.prevent_default();
                    }
                }
            }),
            ("touchmove", |r, e| {
                if let Some((x, y)) = first_touch(e) {
                    e.prevent_default();
                    r.touch_move(x, y);
                }
            }),
            ("touchend", |r, _| r.touch_end()),
            ("touchcancel", |r, _| r.touch_end()),
        ];

        let options = AddEventListenerOptions::new();
        options.set_passive(false);
        for (name, handler) in handlers {
            let closure = self.listener(handler);
            let result = if name.starts_with("touch") {
                body.add_event_listener_with_callback_and_add_event_listener_options(
                    name,
                    closure.as_ref().unchecked_ref(),
                    &options,
                )
            } else {
                body.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            };
            if result.is_err() {
                log::warn!("Failed to add {} listener", name);
            }
            self.installed.push((name, closure));
        }
    }

    fn detach(&mut self) {
        let body = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.body());
        for (name, closure) in self.installed.drain(..) {
            if let Some(body) = &body {
                let _ = body.remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
            }
        }
    }
}

// ============================================================================
// MOUNTED SURFACE
// ============================================================================

struct Host {
    surface: Rc<RefCell<BallpitSurface<WgpuBackend>>>,
    canvas: HtmlCanvasElement,
    size_mode: SizeMode,
    registry: Rc<RefCell<InteractionRegistry>>,
    pointer: Option<SurfaceId>,
    raf_id: Option<i32>,
    frame_loop: Option<Closure<dyn FnMut(f64)>>,
    dom_listeners: Vec<(EventTarget, &'static str, Listener)>,
    intersection: Option<(IntersectionObserver, ObserverCallback)>,
    resize_observer: Option<(ResizeObserver, ObserverCallback)>,
}

impl Host {
    fn metrics(&self) -> HostMetrics {
        let window = web_sys::window();
        let device_pixel_ratio = window.as_ref().map_or(1.0, |w| w.device_pixel_ratio()) as f32;
        let (width, height) = match self.size_mode {
            SizeMode::Window => window
                .as_ref()
                .map(|w| {
                    let width = w.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                    let height = w.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
                    (width as f32, height as f32)
                })
                .unwrap_or_default(),
            SizeMode::Fixed { width, height } => (width, height),
            SizeMode::Parent => match self.canvas.parent_element() {
                Some(parent) => (parent.client_width() as f32, parent.client_height() as f32),
                None => (self.canvas.client_width() as f32, self.canvas.client_height() as f32),
            },
        };
        HostMetrics {
            width,
            height,
            device_pixel_ratio,
        }
    }

    fn apply_canvas_size(&self) {
        let surface = self.surface.borrow();
        let size = *surface.manager.size();
        let (width, height) = match surface.manager.backend() {
            Some(backend) => size.physical_within(backend.max_dimension()),
            None => size.physical(),
        };
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        let style = self.canvas.style();
        let _ = style.set_property("width", &format!("{}px", size.width));
        let _ = style.set_property("height", &format!("{}px", size.height));
    }

    fn listen(&mut self, target: EventTarget, name: &'static str, closure: Listener) {
        if target
            .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            .is_err()
        {
            log::warn!("Failed to add {} listener", name);
        }
        self.dom_listeners.push((target, name, closure));
    }
}

fn schedule_frame(host: &Rc<RefCell<Host>>) {
    let mut h = host.borrow_mut();
    if h.raf_id.is_some() {
        return;
    }
    let Some(window) = web_sys::window() else {
        return;
    };
    let requested = match &h.frame_loop {
        Some(frame_loop) => window.request_animation_frame(frame_loop.as_ref().unchecked_ref()),
        None => return,
    };
    h.raf_id = requested.ok();
}

fn run_frame(host: &Rc<RefCell<Host>>, now: f64) {
    let surface = {
        let mut h = host.borrow_mut();
        h.raf_id = None;
        h.surface.clone()
    };
    let running = surface.borrow_mut().tick(now).is_some();
    if running {
        schedule_frame(host);
    }
}

fn signal_resize(host: &Rc<RefCell<Host>>) {
    let Some(deadline) = host.borrow().surface.borrow_mut().request_resize(now_ms()) else {
        return;
    };
    let Some(window) = web_sys::window() else {
        return;
    };
    let weak = Rc::downgrade(host);
    // Each signal arms its own timer; only the latest one recomputes
    let callback = Closure::once_into_js(move || {
        if let Some(host) = weak.upgrade() {
            let h = host.borrow();
            let metrics = h.metrics();
            let resized = h.surface.borrow_mut().flush_resize(deadline, metrics);
            if resized {
                h.apply_canvas_size();
            }
        }
    });
    let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        RESIZE_DEBOUNCE_MS as i32,
    );
}

fn set_intersecting(host: &Rc<RefCell<Host>>, intersecting: bool) {
    let schedule = host
        .borrow()
        .surface
        .borrow_mut()
        .set_intersecting(intersecting, now_ms());
    if schedule {
        schedule_frame(host);
    }
}

fn set_document_hidden(host: &Rc<RefCell<Host>>, hidden: bool) {
    let schedule = host
        .borrow()
        .surface
        .borrow_mut()
        .set_document_hidden(hidden, now_ms());
    if schedule {
        schedule_frame(host);
    }
}

fn document_hidden() -> bool {
    web_sys::window()
        .and_then(|w| w.document())
        .is_some_and(|d| d.visibility_state() == web_sys::VisibilityState::Hidden)
}

fn install(host: &Rc<RefCell<Host>>) -> Result<(), BallpitError> {
    let window = web_sys::window().ok_or_else(|| BallpitError::MissingSurface("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| BallpitError::MissingSurface("no document".into()))?;

    let weak = Rc::downgrade(host);
    let frame_loop = Closure::<dyn FnMut(f64)>::new(move |now: f64| {
        if let Some(host) = weak.upgrade() {
            run_frame(&host, now);
        }
    });

    let weak = Rc::downgrade(host);
    let intersection_cb = Closure::<dyn FnMut(_)>::new(move |entries: js_sys::Array| {
        let Some(host) = weak.upgrade() else {
            return;
        };
        let last = entries
            .iter()
            .filter_map(|e| e.dyn_into::<IntersectionObserverEntry>().ok())
            .last();
        if let Some(entry) = last {
            set_intersecting(&host, entry.is_intersecting());
        }
    });
    let intersection = IntersectionObserver::new(intersection_cb.as_ref().unchecked_ref())
        .map_err(|_| BallpitError::MissingSurface("IntersectionObserver unavailable".into()))?;

    let weak = Rc::downgrade(host);
    let resize_cb = Closure::<dyn FnMut(_)>::new(move |_entries: js_sys::Array| {
        if let Some(host) = weak.upgrade() {
            signal_resize(&host);
        }
    });
    let resize_observer = ResizeObserver::new(resize_cb.as_ref().unchecked_ref()).ok();

    let weak = Rc::downgrade(host);
    let window_resize = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
        if let Some(host) = weak.upgrade() {
            signal_resize(&host);
        }
    });

    let weak = Rc::downgrade(host);
    let visibility = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
        if let Some(host) = weak.upgrade() {
            set_document_hidden(&host, document_hidden());
        }
    });

    let mut h = host.borrow_mut();
    h.frame_loop = Some(frame_loop);
    h.listen(window.clone().into(), "resize", window_resize);
    h.listen(document.into(), "visibilitychange", visibility);

    if let (Some(observer), Some(parent)) = (&resize_observer, h.canvas.parent_element()) {
        observer.observe(&parent);
    }
    h.resize_observer = resize_observer.map(|o| (o, resize_cb));
    intersection.observe(&h.canvas);
    h.intersection = Some((intersection, intersection_cb));
    Ok(())
}

fn dispose(host: &Rc<RefCell<Host>>) {
    let mut h = host.borrow_mut();
    if !h.surface.borrow_mut().dispose() {
        return;
    }
    if let (Some(id), Some(window)) = (h.raf_id.take(), web_sys::window()) {
        let _ = window.cancel_animation_frame(id);
    }
    if let Some((observer, _)) = h.intersection.take() {
        observer.disconnect();
    }
    if let Some((observer, _)) = h.resize_observer.take() {
        observer.disconnect();
    }
    for (target, name, closure) in h.dom_listeners.drain(..) {
        let _ = target.remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
    }
    if let Some(id) = h.pointer.take() {
        h.registry.borrow_mut().unregister(id);
    }
    h.frame_loop = None;
}

/// Mount a ballpit on `canvas`
pub async fn mount(
    canvas: HtmlCanvasElement,
    config: BallpitConfig,
    mut options: SurfaceOptions,
) -> Result<BallpitHandle, BallpitError> {
    config.validate()?;
    options.seed.get_or_insert_with(|| js_sys::Date::now() as u64);

    let style = canvas.style();
    for (name, value) in [("touch-action", "none"), ("display", "block")] {
        let _ = style.set_property(name, value);
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL,
        ..Default::default()
    });
    let gpu_surface = instance
        .create_surface(wgpu::SurfaceTarget::Canvas(canvas.clone()))
        .map_err(RenderError::from)?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&gpu_surface),
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| {
            log::error!("No GPU adapter: {}", e);
            RenderError::Adapter(e.to_string())
        })?;
    log::info!("Using adapter: {:?}", adapter.get_info().name);

    let size_mode = options.size;
    let (width, height) = (canvas.width(), canvas.height());
    let backend = WgpuBackend::new(
        gpu_surface,
        &adapter,
        width,
        height,
        &ScatteringExtension::new(SCATTERING_BINDING),
    )
    .await?;

    let surface = Rc::new(RefCell::new(BallpitSurface::new(config, options, backend)?));
    let registry = shared_registry();
    let host = Rc::new(RefCell::new(Host {
        surface: surface.clone(),
        canvas: canvas.clone(),
        size_mode,
        registry: registry.clone(),
        pointer: None,
        raf_id: None,
        frame_loop: None,
        dom_listeners: Vec::new(),
        intersection: None,
        resize_observer: None,
    }));

    {
        let h = host.borrow();
        let metrics = h.metrics();
        if surface.borrow_mut().resize(metrics) {
            h.apply_canvas_size();
        }
    }

    let rect_source = canvas.clone();
    let pointer = BallpitPointer::new(Rc::downgrade(&surface), move || {
        let r = rect_source.get_bounding_client_rect();
        Rect::new(r.left() as f32, r.top() as f32, r.width() as f32, r.height() as f32)
    });
    let id = registry.borrow_mut().register(Box::new(pointer));
    host.borrow_mut().pointer = Some(id);

    set_document_hidden(&host, document_hidden());
    install(&host)?;

    Ok(BallpitHandle { host })
}

/// Look up `canvas_id` and mount on it
pub async fn mount_by_id(
    canvas_id: &str,
    config: BallpitConfig,
    options: SurfaceOptions,
) -> Result<BallpitHandle, BallpitError> {
    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(canvas_id))
        .and_then(|e| e.dyn_into::<HtmlCanvasElement>().ok())
        .ok_or_else(|| {
            log::error!("Canvas #{} not found", canvas_id);
            BallpitError::MissingCanvas(canvas_id.to_string())
        })?;
    mount(canvas, config, options).await
}

/// Runtime control surface handed to the page
#[wasm_bindgen]
pub struct BallpitHandle {
    host: Rc<RefCell<Host>>,
}

#[wasm_bindgen]
impl BallpitHandle {
    /// Toggle the simulation; drawing continues. Returns the new paused state.
    #[wasm_bindgen(js_name = togglePause)]
    pub fn toggle_pause(&self) -> bool {
        self.host.borrow().surface.borrow_mut().toggle_pause()
    }

    /// Re-seed with a new body count
    #[wasm_bindgen(js_name = setCount)]
    pub fn set_count(&self, count: usize) -> Result<(), JsValue> {
        self.host
            .borrow()
            .surface
            .borrow_mut()
            .set_count(count)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn dispose(&self) {
        dispose(&self.host);
    }
}

async fn mount_from_json(
    canvas_id: &str,
    config_json: Option<String>,
    options_json: Option<String>,
) -> Result<BallpitHandle, BallpitError> {
    let config = match config_json {
        Some(json) => BallpitConfig::from_json(&json)?,
        None => BallpitConfig::default(),
    };
    let options = match options_json {
        Some(json) => serde_json::from_str(&json).map_err(ConfigError::from)?,
        None => SurfaceOptions::default(),
    };
    mount_by_id(canvas_id, config, options).await
}

/// Mount from JavaScript. Both option bags are optional JSON strings.
#[wasm_bindgen(js_name = mountBallpit)]
pub async fn mount_ballpit(
    canvas_id: String,
    config_json: Option<String>,
    options_json: Option<String>,
) -> Result<BallpitHandle, JsValue> {
    init_logging();
    mount_from_json(&canvas_id, config_json, options_json)
        .await
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
