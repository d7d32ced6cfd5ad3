use crate::constants::*;
use serde::{Deserialize, Serialize};

///Represents a vector in map space.
/// Positive y points down the map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Unit vector pointing along `angle` radians, measured clockwise from +x.
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn distance(&self, other: &Vector2) -> f32 {
        self.sub(other).magnitude()
    }
}

/// Axis-aligned rectangle given by its top-left corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn centre(&self) -> Vector2 {
        Vector2::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// Half-open on the right and bottom edges so adjacent rects never share a point.
    pub fn contains(&self, point: &Vector2) -> bool {
        point.x >= self.left && point.x < self.right() && point.y >= self.top && point.y < self.bottom()
    }
}

/// Movement tuning carried with the world so every consumer integrates
/// with identical numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PhysicsParams {
    pub gravity: f32,
    pub run_speed: f32,
    pub jump_speed: f32,
    pub ghost_speed: f32,
    pub shot_speed: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            run_speed: RUN_SPEED,
            jump_speed: JUMP_SPEED,
            ghost_speed: GHOST_SPEED,
            shot_speed: SHOT_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Normal,
    LowGravity,
    HighSpeed,
}

impl GameMode {
    pub fn physics(self) -> PhysicsParams {
        let base = PhysicsParams::default();
        match self {
            GameMode::Normal => base,
            GameMode::LowGravity => PhysicsParams {
                gravity: base.gravity * 0.25,
                ..base
            },
            GameMode::HighSpeed => PhysicsParams {
                run_speed: base.run_speed * 1.5,
                ghost_speed: base.ghost_speed * 1.5,
                shot_speed: base.shot_speed * 1.5,
                ..base
            },
        }
    }
}

/// Seconds of game time covered by one tick at the given game speed.
pub fn tick_seconds(speed: f32) -> f32 {
    TICK_PERIOD as f32 * speed
}

/// Y coordinate a body of `radius` rests at when standing on the floor of
/// the zone row containing `y`.
pub fn floor_below(y: f32, radius: f32, map_height: f32) -> f32 {
    let row_floor = ((y / ZONE_HEIGHT).floor() + 1.0) * ZONE_HEIGHT;
    row_floor.min(map_height) - radius
}
