//! Example component types used by tests and tooling.
//!
//! Domain components are instances of the generic schema mechanism; these
//! two are the canonical ones the rest of the workspace exercises.

use cospace_common::Transform2d;
use cospace_schema::{ComponentType, Schema, SchemaExt, number, object2, text};
use glam::Vec2;

/// Schema for a planar vector persisted as `{x, y}`.
pub fn vec2() -> impl Schema<Value = Vec2> {
    object2("x", number(), "y", number()).map(
        |(x, y)| Vec2::new(x as f32, y as f32),
        |v| (f64::from(v.x), f64::from(v.y)),
    )
}

/// Schema for [`Transform2d`], persisted as `{origin: {x, y}, orientation: {x, y}}`.
pub fn transform2d() -> impl Schema<Value = Transform2d> {
    object2("origin", vec2(), "orientation", vec2()).map(
        |(origin, orientation)| Transform2d {
            origin,
            orientation,
        },
        |t| (t.origin, t.orientation),
    )
}

/// The `transform` component type.
pub fn transform_type() -> ComponentType {
    ComponentType::new("transform", transform2d())
}

/// The `label` component type: a human-readable name.
pub fn label_type() -> ComponentType {
    ComponentType::new("label", text())
}
