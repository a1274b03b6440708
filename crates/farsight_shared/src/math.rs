//! Mathematical types shared between the cache and its hosts.
//!
//! These are the canonical representations copied out of the world.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - world-space point or offset
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// World position with orientation.
///
/// `facing` is the yaw in radians. It never takes part in distance math.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
    /// Z coordinate (height)
    pub z: f32,
    /// Yaw in radians
    pub facing: f32,
}

impl Position {
    /// Creates a position facing along +X.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z, facing: 0.0 }
    }

    /// Sets the facing.
    #[must_use]
    pub const fn with_facing(mut self, facing: f32) -> Self {
        self.facing = facing;
        self
    }

    /// Origin
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Drops the facing.
    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Squared distance on the ground plane, ignoring height.
    #[must_use]
    pub fn planar_distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Squared 3D distance.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        self.to_vec3().distance_squared(other.to_vec3())
    }
}

/// How distances between positions are measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Ground-plane distance over `(x, y)`.
    Planar,
    /// Full 3D Euclidean distance.
    #[default]
    Spatial,
}

impl DistanceMetric {
    /// Squared distance between two positions under this metric.
    #[inline]
    #[must_use]
    pub fn distance_squared(self, a: Position, b: Position) -> f32 {
        match self {
            Self::Planar => a.planar_distance_squared(b),
            Self::Spatial => a.distance_squared(b),
        }
    }
}
