use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use blobsim2d::{BlobSimPlugin, ExternalForcing, JetImpulse, MaterialId, PaintEvent, Simulation};

/// Pixels per domain unit.
const VIEW_SCALE: f32 = 640.0;
const ROTATION_STEP: f32 = 0.5;
const BRUSH_RADIUS: f32 = 0.02;

#[derive(Resource, Default)]
struct Brush {
    material: MaterialId,
    rotation_rate: f32,
    last_paint: Option<Vec2>,
}

fn to_world(position: Vec2) -> Vec2 {
    (position - Vec2::splat(0.5)) * VIEW_SCALE
}

fn to_domain(world: Vec2) -> Vec2 {
    world / VIEW_SCALE + Vec2::splat(0.5)
}

fn init(mut commands: Commands, simulation: Res<Simulation>, mut brush: ResMut<Brush>) {
    commands.spawn(Camera2d);
    if let Some(blob) = simulation.materials().find("blob") {
        brush.material = blob;
    }
    info!("left mouse paints, right mouse pushes, arrows rotate, 1-5 pick a material");
}

fn handle_keyboard(
    keys: Res<ButtonInput<KeyCode>>,
    mut brush: ResMut<Brush>,
    mut simulation: ResMut<Simulation>,
) {
    let digits = [
        KeyCode::Digit1,
        KeyCode::Digit2,
        KeyCode::Digit3,
        KeyCode::Digit4,
        KeyCode::Digit5,
    ];
    for (slot, key) in digits.iter().enumerate() {
        if !keys.just_pressed(*key) {
            continue;
        }
        if let Some((id, material)) = simulation.materials().iter().nth(slot) {
            brush.material = id;
            info!("brush material: {}", material.name());
        }
    }

    let mut rotation = brush.rotation_rate;
    if keys.just_pressed(KeyCode::ArrowLeft) {
        rotation += ROTATION_STEP;
    }
    if keys.just_pressed(KeyCode::ArrowRight) {
        rotation -= ROTATION_STEP;
    }
    if keys.just_pressed(KeyCode::Space) {
        rotation = 0.0;
    }
    if rotation != brush.rotation_rate {
        brush.rotation_rate = rotation;
        simulation.queue_forcing(ExternalForcing::rotation(rotation));
        info!("plate rotation: {rotation:.1} rad/s");
    }
}

fn handle_mouse(
    buttons: Res<ButtonInput<MouseButton>>,
    window: Query<&Window, With<PrimaryWindow>>,
    camera: Query<(&Camera, &GlobalTransform)>,
    mut brush: ResMut<Brush>,
    mut simulation: ResMut<Simulation>,
) {
    let Ok(window) = window.single() else {
        return;
    };
    let Ok((camera, camera_transform)) = camera.single() else {
        return;
    };
    let Some(cursor) = window
        .cursor_position()
        .and_then(|cursor| camera.viewport_to_world_2d(camera_transform, cursor).ok())
    else {
        brush.last_paint = None;
        return;
    };
    let position = to_domain(cursor);

    if buttons.pressed(MouseButton::Left) {
        let spaced = brush
            .last_paint
            .is_none_or(|last| last.distance(position) > BRUSH_RADIUS);
        if spaced {
            simulation.queue_paint(PaintEvent {
                position,
                material: brush.material,
                radius: BRUSH_RADIUS,
            });
            brush.last_paint = Some(position);
        }
    } else {
        brush.last_paint = None;
    }

    if buttons.just_pressed(MouseButton::Right) {
        let center = simulation.config().plate_center();
        let impulse = (center - position).normalize_or_zero() * 0.5;
        simulation.queue_forcing(
            ExternalForcing::rotation(brush.rotation_rate).with_jet(JetImpulse {
                position,
                impulse,
                radius: 0.05,
            }),
        );
    }
}

fn draw(simulation: Res<Simulation>, mut gizmos: Gizmos) {
    let config = simulation.config();
    gizmos.circle_2d(
        to_world(config.plate_center()),
        config.plate_radius * VIEW_SCALE,
        Color::srgb(0.4, 0.4, 0.45),
    );

    let scalar = simulation.scalar_field();
    let cell = scalar.spacing() * VIEW_SCALE;
    for j in 0..scalar.height() {
        for i in 0..scalar.width() {
            let thickness = scalar.get(i, j);
            if thickness > 0.02 {
                gizmos.rect_2d(
                    to_world(scalar.position(i, j)),
                    Vec2::splat(cell),
                    Color::srgba(0.2, 0.5, 0.9, thickness.min(1.0)),
                );
            }
        }
    }

    let positions = simulation.particle_positions();
    let radii = simulation.particle_radii();
    for (position, radius) in positions.iter().zip(radii) {
        gizmos.circle_2d(
            to_world(*position),
            (radius * VIEW_SCALE).max(1.0),
            Color::srgb(0.95, 0.55, 0.2),
        );
    }
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(BlobSimPlugin::default())
        .init_resource::<Brush>()
        .add_systems(Startup, init.run_if(resource_exists::<Simulation>))
        .add_systems(
            Update,
            (handle_keyboard, handle_mouse, draw).run_if(resource_exists::<Simulation>),
        )
        .run();
}
