use anyhow::{anyhow, Result};
use glam::Vec2;
use rand::Rng;

use super::{ComponentRegistry, ContextValues, PropsExt, RegisteredComponent, TickEnv};
use crate::buffer::{BufferResult, StateBuffer};
use crate::camera::parse_tint;
use crate::entity::ScratchRange;
use crate::msc::Props;
use crate::state::EngineState;

pub const BUILTIN_IDS: [&str; 19] = [
    "Gravity",
    "Kinematic",
    "Collider",
    "Friction",
    "PlayerController",
    "Health",
    "Lifetime",
    "Hitbox",
    "PlatformController",
    "ScreenShake",
    "Camera",
    "Interactable",
    "AreaTrigger",
    "Animator",
    "PathFollower",
    "Patrol",
    "Chase",
    "Bounds",
    "Spawner",
];

pub fn register_builtins(registry: &mut ComponentRegistry) {
    registry.register("Gravity", RegisteredComponent::new(gravity));
    registry.register("Kinematic", RegisteredComponent::new(kinematic).with_context(kinematic_context));
    registry.register("Collider", RegisteredComponent::new(collider));
    registry.register("Friction", RegisteredComponent::new(friction));
    registry.register("PlayerController", RegisteredComponent::new(player_controller));
    registry.register("Health", RegisteredComponent::new(health).with_context(health_context));
    registry.register(
        "Lifetime",
        RegisteredComponent::new(lifetime).with_context(|buffer, ptr, _, scratch| {
            scratch_context(buffer, ptr, scratch, "$lifetime")
        })
        .with_scratch(1),
    );
    registry.register("Hitbox", RegisteredComponent::new(hitbox));
    registry.register(
        "PlatformController",
        RegisteredComponent::new(platform_controller).with_context(platform_context).with_scratch(1),
    );
    registry.register("ScreenShake", RegisteredComponent::new(screen_shake));
    registry.register("Camera", RegisteredComponent::new(camera));
    registry.register(
        "Interactable",
        RegisteredComponent::new(interactable)
            .with_context(|buffer, ptr, _, scratch| scratch_context(buffer, ptr, scratch, "$triggered"))
            .with_scratch(1),
    );
    registry.register(
        "AreaTrigger",
        RegisteredComponent::new(area_trigger)
            .with_context(|buffer, ptr, _, scratch| scratch_context(buffer, ptr, scratch, "$triggered"))
            .with_scratch(1),
    );
    registry.register("Animator", RegisteredComponent::new(|_, _, _, _| Ok(())));
    registry.register(
        "PathFollower",
        RegisteredComponent::new(path_follower).with_context(path_context).with_scratch(2),
    );
    registry.register("Patrol", RegisteredComponent::new(patrol).with_scratch(1));
    registry.register("Chase", RegisteredComponent::new(chase));
    registry.register("Bounds", RegisteredComponent::new(bounds));
    registry.register("Spawner", RegisteredComponent::new(spawner).with_scratch(1));
}

fn round_i64(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

fn center(buffer: &StateBuffer, ptr: usize) -> BufferResult<Vec2> {
    let (x, y) = buffer.position(ptr)?;
    Ok(Vec2::new(f32::from(x), f32::from(y)))
}

/// Active slots other than `ptr`, filtered by the `target` prop when one is given.
fn others(state: &EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> BufferResult<Vec<usize>> {
    let target = env.target_type(props);
    let mut out = Vec::new();
    for other in state.buffer.active_slots() {
        if other == ptr {
            continue;
        }
        let matches = match target {
            None => true,
            Some(None) => false,
            Some(Some(type_id)) => state.buffer.type_id(other)? == type_id,
        };
        if matches {
            out.push(other);
        }
    }
    Ok(out)
}

fn overlaps(a: Vec2, b: Vec2, width: f64, height: f64) -> bool {
    let d = (b - a).abs();
    f64::from(d.x) < width && f64::from(d.y) < height
}

fn scratch_context(buffer: &StateBuffer, ptr: usize, scratch: ScratchRange, name: &str) -> BufferResult<ContextValues> {
    let mut values = ContextValues::new();
    values.insert(name.to_string(), f64::from(buffer.scratch_u8(ptr, scratch, 0)?));
    Ok(values)
}

fn gravity(state: &mut EngineState, ptr: usize, props: &Props, _: &TickEnv<'_>) -> Result<()> {
    let force = props.number("force", 1.0);
    let (vx, vy) = state.buffer.velocity(ptr)?;
    state.buffer.set_velocity(ptr, i64::from(vx), round_i64(f64::from(vy) + force))?;
    Ok(())
}

fn kinematic(state: &mut EngineState, ptr: usize, _: &Props, _: &TickEnv<'_>) -> Result<()> {
    let (x, y) = state.buffer.position(ptr)?;
    let (vx, vy) = state.buffer.velocity(ptr)?;
    state.buffer.set_position(ptr, i64::from(x) + i64::from(vx), i64::from(y) + i64::from(vy))?;
    Ok(())
}

fn kinematic_context(buffer: &StateBuffer, ptr: usize, _: &Props, _: ScratchRange) -> BufferResult<ContextValues> {
    let (x, y) = buffer.position(ptr)?;
    let (vx, vy) = buffer.velocity(ptr)?;
    Ok(ContextValues::from([
        ("$vx".to_string(), f64::from(vx)),
        ("$vy".to_string(), f64::from(vy)),
        ("$px".to_string(), f64::from(x)),
        ("$py".to_string(), f64::from(y)),
    ]))
}

fn collider(state: &mut EngineState, ptr: usize, _: &Props, env: &TickEnv<'_>) -> Result<()> {
    if env.assets.point_in_any_polygon(center(&state.buffer, ptr)?) {
        state.buffer.set_velocity(ptr, 0, 0)?;
    }
    Ok(())
}

fn friction(state: &mut EngineState, ptr: usize, props: &Props, _: &TickEnv<'_>) -> Result<()> {
    let factor = props.number("factor", 0.9);
    let (vx, vy) = state.buffer.velocity(ptr)?;
    let damp = |v: i16| {
        let scaled = f64::from(v) * factor;
        if scaled.is_finite() {
            scaled.trunc() as i64
        } else {
            0
        }
    };
    state.buffer.set_velocity(ptr, damp(vx), damp(vy))?;
    Ok(())
}

/// -1, 0 or 1 from a pair of opposing actions.
fn axis(env: &TickEnv<'_>, negative: &str, positive: &str) -> i64 {
    i64::from(env.input.is_active(positive)) - i64::from(env.input.is_active(negative))
}

fn player_controller(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let speed = round_i64(props.number("speed", 1.0));
    let vx = axis(env, "Left", "Right") * speed;
    let vy = axis(env, "Up", "Down") * speed;
    state.buffer.set_velocity(ptr, vx, vy)?;
    Ok(())
}

fn health(state: &mut EngineState, ptr: usize, _: &Props, _: &TickEnv<'_>) -> Result<()> {
    if state.buffer.health(ptr)? == 0 {
        state.buffer.set_active(ptr, false)?;
    }
    Ok(())
}

fn health_context(buffer: &StateBuffer, ptr: usize, _: &Props, _: ScratchRange) -> BufferResult<ContextValues> {
    Ok(ContextValues::from([("$health".to_string(), f64::from(buffer.health(ptr)?))]))
}

/// Scratch byte 0 holds the remaining frames; 0 means the countdown has not started.
fn lifetime(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let frames = round_i64(props.number("frames", 60.0));
    let remaining = state.buffer.scratch_u8(ptr, env.scratch, 0)?;
    if remaining == 0 {
        if frames <= 0 {
            state.buffer.set_active(ptr, false)?;
        } else {
            state.buffer.set_scratch_u8(ptr, env.scratch, 0, frames.min(255) as u8)?;
        }
        return Ok(());
    }
    let next = remaining - 1;
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, next)?;
    if next == 0 {
        state.buffer.set_active(ptr, false)?;
    }
    Ok(())
}

fn hitbox(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let width = props.number("width", 8.0);
    let height = props.number("height", 8.0);
    let damage = round_i64(props.number("damage", 1.0));
    let knockback = props.number("knockback", 0.0) as f32;
    let origin = center(&state.buffer, ptr)?;
    for other in others(state, ptr, props, env)? {
        let position = center(&state.buffer, other)?;
        if !overlaps(origin, position, width, height) {
            continue;
        }
        let health = i64::from(state.buffer.health(other)?);
        state.buffer.set_health(other, (health - damage).max(0))?;
        if knockback != 0.0 {
            let dir = (position - origin).try_normalize().unwrap_or(Vec2::X);
            let push = (dir * knockback).round();
            let (vx, vy) = state.buffer.velocity(other)?;
            state.buffer.set_velocity(other, i64::from(vx) + push.x as i64, i64::from(vy) + push.y as i64)?;
        }
    }
    Ok(())
}

fn platform_controller(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let speed = round_i64(props.number("speed", 2.0));
    let jump_force = round_i64(props.number("jumpForce", 6.0));
    let feet = center(&state.buffer, ptr)? + Vec2::Y;
    let grounded = env.assets.point_in_any_polygon(feet);
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, u8::from(grounded))?;

    let (_, vy) = state.buffer.velocity(ptr)?;
    let vx = axis(env, "MoveLeft", "MoveRight") * speed;
    let vy = if grounded && env.input.is_active("Jump") { -jump_force } else { i64::from(vy) };
    state.buffer.set_velocity(ptr, vx, vy)?;
    Ok(())
}

fn platform_context(buffer: &StateBuffer, ptr: usize, _: &Props, scratch: ScratchRange) -> BufferResult<ContextValues> {
    let (_, vy) = buffer.velocity(ptr)?;
    Ok(ContextValues::from([
        ("$isGrounded".to_string(), f64::from(buffer.scratch_u8(ptr, scratch, 0)?)),
        ("$vy".to_string(), f64::from(vy)),
    ]))
}

fn screen_shake(state: &mut EngineState, _: usize, props: &Props, _: &TickEnv<'_>) -> Result<()> {
    let intensity = round_i64(props.number("intensity", 2.0)).abs();
    let x = state.rng.gen_range(-intensity..=intensity);
    let y = state.rng.gen_range(-intensity..=intensity);
    state.buffer.set_camera_shake(x, y)?;
    Ok(())
}

fn camera(state: &mut EngineState, ptr: usize, props: &Props, _: &TickEnv<'_>) -> Result<()> {
    let focus = center(&state.buffer, ptr)?;
    let screen = state.screen_size();
    state.camera.zoom = props.number("zoom", 1.0) as f32;
    state.camera.shake = props.number("shake", 0.0) as f32;
    state.camera.tint = parse_tint(props.text("tint").unwrap_or_default());
    let target = state.camera.target_for(focus, screen);
    state.camera.follow(target, props.number("followSpeed", 1.0) as f32);
    Ok(())
}

fn interactable(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let radius = props.number("radius", 16.0) as f32;
    let action = props.text("action").unwrap_or("Interact");
    let origin = center(&state.buffer, ptr)?;
    let mut triggered = false;
    if env.input.is_active(action) {
        for other in others(state, ptr, props, env)? {
            if center(&state.buffer, other)?.distance(origin) <= radius {
                triggered = true;
                break;
            }
        }
    }
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, u8::from(triggered))?;
    Ok(())
}

fn area_trigger(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let width = props.number("width", 16.0);
    let height = props.number("height", 16.0);
    let origin = center(&state.buffer, ptr)?;
    let mut triggered = false;
    for other in others(state, ptr, props, env)? {
        if overlaps(origin, center(&state.buffer, other)?, width, height) {
            triggered = true;
            break;
        }
    }
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, u8::from(triggered))?;
    Ok(())
}

/// Scratch holds the current point index as a u16.
fn path_follower(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let path = props.number("path", 0.0).max(0.0) as usize;
    let len = env.assets.path_len(path);
    if len == 0 {
        return Ok(());
    }
    let progress = usize::from(state.buffer.scratch_u16(ptr, env.scratch, 0)?).min(len - 1);
    if let Some(point) = env.assets.path_point(path, progress) {
        state.buffer.set_position(ptr, round_i64(f64::from(point.x)), round_i64(f64::from(point.y)))?;
    }
    let step = round_i64(props.number("speed", 1.0)).max(0) as usize;
    let next = progress + step;
    let next = if next < len {
        next
    } else if props.flag("loop", true) {
        next % len
    } else {
        len - 1
    };
    state.buffer.set_scratch_u16(ptr, env.scratch, 0, next.min(usize::from(u16::MAX)) as u16)?;
    Ok(())
}

fn path_context(buffer: &StateBuffer, ptr: usize, _: &Props, scratch: ScratchRange) -> BufferResult<ContextValues> {
    Ok(ContextValues::from([("$progress".to_string(), f64::from(buffer.scratch_u16(ptr, scratch, 0)?))]))
}

/// Scratch byte 0 is the walking direction: 0 right, 1 left.
fn patrol(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let speed = round_i64(props.number("speed", 1.0)).abs();
    let mut left = state.buffer.scratch_u8(ptr, env.scratch, 0)? != 0;
    let position = center(&state.buffer, ptr)?;
    let step = if left { -speed } else { speed };
    let ahead = position + Vec2::new(step as f32, 0.0);
    if ahead.x < 0.0 || env.assets.point_in_any_polygon(ahead) {
        left = !left;
    }
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, u8::from(left))?;
    let (_, vy) = state.buffer.velocity(ptr)?;
    state.buffer.set_velocity(ptr, if left { -speed } else { speed }, i64::from(vy))?;
    Ok(())
}

fn chase(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let speed = props.number("speed", 1.0) as f32;
    let origin = center(&state.buffer, ptr)?;
    let mut nearest: Option<(f32, Vec2)> = None;
    for other in others(state, ptr, props, env)? {
        let position = center(&state.buffer, other)?;
        let dist = position.distance_squared(origin);
        if nearest.map_or(true, |(best, _)| dist < best) {
            nearest = Some((dist, position));
        }
    }
    if let Some((_, position)) = nearest {
        let velocity = ((position - origin).normalize_or_zero() * speed).round();
        state.buffer.set_velocity(ptr, velocity.x as i64, velocity.y as i64)?;
    }
    Ok(())
}

fn bounds(state: &mut EngineState, ptr: usize, props: &Props, _: &TickEnv<'_>) -> Result<()> {
    let min_x = round_i64(props.number("minX", 0.0));
    let min_y = round_i64(props.number("minY", 0.0));
    let max_x = round_i64(props.number("maxX", f64::from(state.width))).max(min_x);
    let max_y = round_i64(props.number("maxY", f64::from(state.height))).max(min_y);
    let (x, y) = state.buffer.position(ptr)?;
    let (vx, vy) = state.buffer.velocity(ptr)?;
    let (x, y) = (i64::from(x), i64::from(y));
    let cx = x.clamp(min_x, max_x);
    let cy = y.clamp(min_y, max_y);
    state.buffer.set_position(ptr, cx, cy)?;
    state.buffer.set_velocity(
        ptr,
        if cx != x { 0 } else { i64::from(vx) },
        if cy != y { 0 } else { i64::from(vy) },
    )?;
    Ok(())
}

/// Scratch byte 0 counts down to the next spawn; 0 means the countdown has not started.
fn spawner(state: &mut EngineState, ptr: usize, props: &Props, env: &TickEnv<'_>) -> Result<()> {
    let name = props.text("entity").ok_or_else(|| anyhow!("Spawner needs an `entity` prop"))?;
    let type_id = env.document.type_id(name).ok_or_else(|| anyhow!("Spawner entity '{name}' is not defined"))?;
    let interval = round_i64(props.number("interval", 60.0)).clamp(1, 255) as u8;
    let mut remaining = state.buffer.scratch_u8(ptr, env.scratch, 0)?;
    if remaining == 0 {
        remaining = interval;
    }
    remaining -= 1;
    if remaining == 0 {
        let (x, y) = state.buffer.position(ptr)?;
        let x = i64::from(x) + round_i64(props.number("offsetX", 0.0));
        let y = i64::from(y) + round_i64(props.number("offsetY", 0.0));
        let health = env.document.entity_by_type(type_id).map_or(100, |(_, def)| def.initial_health());
        state.buffer.spawn_entity(type_id, x, y, health)?;
        remaining = interval;
    }
    state.buffer.set_scratch_u8(ptr, env.scratch, 0, remaining)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::BakedAssets;
    use crate::entity::slot_ptr;
    use crate::input::InputSnapshot;
    use crate::msc::Document;
    use serde_json::json;

    fn props(value: serde_json::Value) -> Props {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn spawner_emits_on_interval() {
        let mut doc = Document::default();
        doc.entities.insert("Nest", Default::default());
        doc.entities.insert("Bug", Default::default());
        let mut state = EngineState::with_seed(64, 64, 1);
        let nest = state.buffer.spawn_entity(1, 10, 10, 100).expect("spawn").expect("slot");
        let input = InputSnapshot::new();
        let assets = BakedAssets::new();
        let env = TickEnv::new(&input, &assets, &doc).with_scratch(ScratchRange::new(0, 1));
        let spawner_props = props(json!({ "entity": "Bug", "interval": 2, "offsetX": 4 }));

        spawner(&mut state, nest, &spawner_props, &env).expect("tick 1");
        assert_eq!(state.buffer.active_slots().len(), 1);
        spawner(&mut state, nest, &spawner_props, &env).expect("tick 2");
        let slots = state.buffer.active_slots();
        assert_eq!(slots.len(), 2, "second tick spawns");
        assert_eq!(state.buffer.type_id(slots[1]).expect("type"), 2);
        assert_eq!(state.buffer.position(slots[1]).expect("pos"), (14, 10));
    }

    #[test]
    fn spawner_with_unknown_entity_fails() {
        let doc = Document::default();
        let mut state = EngineState::with_seed(64, 64, 1);
        let input = InputSnapshot::new();
        let assets = BakedAssets::new();
        let env = TickEnv::new(&input, &assets, &doc).with_scratch(ScratchRange::new(0, 1));
        let err = spawner(&mut state, slot_ptr(0), &props(json!({ "entity": "Ghost" })), &env).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn bounds_clamps_and_stops_motion() {
        let doc = Document::default();
        let mut state = EngineState::with_seed(64, 64, 1);
        let ptr = slot_ptr(0);
        state.buffer.set_active(ptr, true).expect("active");
        state.buffer.set_position(ptr, 80, 10).expect("pos");
        state.buffer.set_velocity(ptr, 3, -2).expect("vel");
        let input = InputSnapshot::new();
        let assets = BakedAssets::new();
        let env = TickEnv::new(&input, &assets, &doc);
        bounds(&mut state, ptr, &Props::new(), &env).expect("tick");
        assert_eq!(state.buffer.position(ptr).expect("pos"), (64, 10));
        assert_eq!(state.buffer.velocity(ptr).expect("vel"), (0, -2));
    }
}
