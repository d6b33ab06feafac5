use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Player-wide settings shared by every node of one runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Scripting version; selects the coercion rules.
    pub version: u8,
    pub frame_rate: f32,
    pub stage_size: Vec2,
    pub background: Vec3,
    /// Seed for the shared pseudo-random generator.
    pub seed: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            version: 7,
            frame_rate: 12.0,
            stage_size: Vec2::new(550.0, 400.0),
            background: Vec3::ONE,
            seed: 0,
        }
    }
}

impl PlayerConfig {
    /// Duration of one frame at the configured rate.
    pub fn frame_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(1.0 / self.frame_rate.max(1.0))
    }
}
