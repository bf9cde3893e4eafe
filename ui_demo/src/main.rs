//! UI core demo
//!
//! Builds a small screen-overlay menu with a world-space nameplate, drives a
//! few frames and moves a pointer across the menu, logging what it hits.
//!
//! Usage: `ui_demo [settings.toml|settings.ron]`

use std::cell::Cell;
use std::rc::Rc;

use rect_ui::config::ConfigError;
use rect_ui::foundation::logging;
use rect_ui::prelude::*;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("settings: {0}")]
    Settings(#[from] ConfigError),
    #[error("ui: {0}")]
    Ui(#[from] UiError),
}

/// Counts frames and logs when the button it sits on is resized
struct ButtonBehaviour {
    label: &'static str,
    frames: Rc<Cell<u32>>,
}

impl UiBehaviour for ButtonBehaviour {
    fn start(&mut self, ctx: &mut BehaviourContext<'_>) {
        log::info!("{} started on {:?}", self.label, ctx.node);
    }

    fn update(&mut self, _ctx: &mut BehaviourContext<'_>, _delta_time: f32) {
        self.frames.set(self.frames.get() + 1);
    }

    fn on_hierarchy_event(&mut self, world: &UiWorld, node: NodeKey, event: &HierarchyEvent) -> bool {
        if let HierarchyEvent::DimensionsChanged { size_changed: true, .. } = event {
            log::info!("{} resized to {:?}", self.label, world.tree().size(node));
        }
        false
    }
}

struct Menu {
    canvas: NodeKey,
    buttons: Vec<NodeKey>,
    frames: Rc<Cell<u32>>,
}

fn build_menu(world: &mut UiWorld) -> Result<Menu, DemoError> {
    let canvas = world.on_attach(HostId(1), None)?;
    world.set_name(canvas, "menu")?;
    world.set_size_delta(canvas, Vec2::new(320.0, 240.0))?;
    let surface = world.add_surface(canvas, RenderMode::ScreenOverlay)?;
    world.set_sort_order(surface, 10, false)?;
    world.add_canvas_group(canvas)?;

    // Buttons are built in one session so their order is resolved once.
    let session = SessionId(1);
    world.begin_bulk_session(session)?;
    let frames = Rc::new(Cell::new(0));
    let mut buttons = Vec::new();
    for (index, label) in ["play", "options", "quit"].into_iter().enumerate() {
        let button = world.on_attach_in_session(HostId(10 + index as u64), Some(canvas), session)?;
        world.set_name(button, label)?;
        world.set_horizontal_anchor_min_max(button, Vec2::new(0.0, 1.0), true, false)?;
        world.set_anchor_left(button, 20.0)?;
        world.set_anchor_right(button, 20.0)?;
        world.set_height(button, 40.0)?;
        world.set_vertical_anchored_position(button, 60.0 - 60.0 * index as f32)?;
        world.set_raycast_target(button, true)?;
        world.add_behaviour(
            button,
            Box::new(ButtonBehaviour {
                label,
                frames: Rc::clone(&frames),
            }),
        )?;
        buttons.push(button);
    }
    world.end_bulk_session(session)?;

    Ok(Menu {
        canvas,
        buttons,
        frames,
    })
}

fn build_nameplate(world: &mut UiWorld) -> Result<NodeKey, DemoError> {
    let plate = world.on_attach(HostId(100), None)?;
    world.set_name(plate, "nameplate")?;
    world.set_size_delta(plate, Vec2::new(80.0, 20.0))?;
    world.set_relative_location(plate, Vec3::new(-50.0, 0.0, 0.0))?;
    world.add_surface(plate, RenderMode::WorldSpaceCustom)?;
    world.set_raycast_target(plate, true)?;
    Ok(plate)
}

fn run() -> Result<(), DemoError> {
    let settings = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading settings from {path}");
            let settings = UiSettings::load_from_file(&path)?;
            settings.validate().map_err(ConfigError::Invalid)?;
            settings
        }
        None => UiSettings::default(),
    };

    let mut world = UiWorld::with_settings(settings);
    let menu = build_menu(&mut world)?;
    let plate = build_nameplate(&mut world)?;
    world.add_raycaster(Raycaster::new(10, TraceChannel::default(), RenderModeMask::SCREEN_OVERLAY));
    world.add_raycaster(Raycaster::new(0, TraceChannel::default(), RenderModeMask::WORLD_SPACE));

    let dt = 1.0 / 60.0;
    for _ in 0..3 {
        world.tick(dt);
    }
    log::info!("{} button updates after 3 frames", menu.frames.get());

    for z in [70.0, 0.0, -60.0, -110.0] {
        let hits = world.raycast(Vec3::new(100.0, 0.0, z), Vec3::new(-100.0, 0.0, z));
        let names: Vec<&str> = hits
            .iter()
            .filter_map(|hit| world.node(hit.node).map(|n| n.name()))
            .collect();
        log::info!("pointer at z={z}: {names:?}");
    }

    // Disabling the menu lets the pointer fall through to the nameplate.
    world.set_ui_active(menu.canvas, false)?;
    world.tick(dt);
    let hits = world.raycast(Vec3::new(100.0, 0.0, 0.0), Vec3::new(-100.0, 0.0, 0.0));
    log::info!(
        "menu hidden: hit {:?} (nameplate is {plate:?})",
        hits.first().map(|hit| hit.node)
    );

    world.set_paused(true);
    let before = menu.frames.get();
    world.set_ui_active(menu.canvas, true)?;
    world.tick(dt);
    log::info!("paused frame ran {} screen-space updates", menu.frames.get() - before);

    world.on_detach(menu.buttons[2])?;
    world.tick(dt);
    log::info!("{} buttons left", world.node(menu.canvas).map_or(0, |n| n.children().len()));
    Ok(())
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        log::error!("ui demo failed: {e}");
        std::process::exit(1);
    }
}
