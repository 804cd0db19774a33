//! Spatial transform of the 3D layer relative to the trigger image.
//!
//! No edit operations are exposed yet; the transform always travels with its
//! identity defaults. It is still part of the persisted shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0],
        scale: [1.0, 1.0, 1.0],
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// The `position`, `rotation` and `scale` form fields, each a JSON array.
    pub fn form_fields(&self) -> Result<[(&'static str, String); 3], serde_json::Error> {
        Ok([
            ("position", serde_json::to_string(&self.position)?),
            ("rotation", serde_json::to_string(&self.rotation)?),
            ("scale", serde_json::to_string(&self.scale)?),
        ])
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
