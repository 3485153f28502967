//! Render records for body snapshots

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::sim::Body;

/// One body as the renderer sees it
///
/// `#[repr(C)]` and `Pod` so a snapshot slice can be uploaded as an instance
/// buffer with `bytemuck::cast_slice`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BodyInstance {
    pub position: [f32; 2],
    pub radius: f32,
    /// RGBA
    pub color: u32,
}

impl BodyInstance {
    pub const fn new(x: f32, y: f32, radius: f32, color: u32) -> Self {
        Self {
            position: [x, y],
            radius,
            color,
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        Vec2::from(self.position)
    }

    /// Color as normalized floats for shader uniforms
    pub fn color_f32(&self) -> [f32; 4] {
        colors::to_f32(self.color)
    }
}

impl From<&Body> for BodyInstance {
    fn from(body: &Body) -> Self {
        Self::new(body.pos.x, body.pos.y, body.radius(), body.color)
    }
}

/// Colors for spawned bodies
pub mod colors {
    /// RGBA palette cycled through at spawn
    pub const PALETTE: [u32; 6] = [
        0xFF0000FF, // Red
        0x00FF00FF, // Green
        0x0000FFFF, // Blue
        0xFF00FFFF, // Magenta
        0x00FFFFFF, // Cyan
        0xFFFF00FF, // Yellow
    ];

    pub fn to_f32(rgba: u32) -> [f32; 4] {
        let [r, g, b, a] = rgba.to_be_bytes();
        [
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ]
    }
}
