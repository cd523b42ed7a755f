//! Lattice positions, continuous positions and facing angles.

use cgmath::InnerSpace;
use std::fmt;

/// Continuous world position, in blocks.
pub type Vec3 = cgmath::Vector3<f64>;

/// Integer lattice position of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: BlockPos = BlockPos::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block containing a continuous position.
    pub fn containing(pos: Vec3) -> Self {
        Self {
            x: pos.x.floor() as i32,
            y: pos.y.floor() as i32,
            z: pos.z.floor() as i32,
        }
    }

    /// Center of the block in continuous coordinates.
    pub fn center(self) -> Vec3 {
        Vec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    pub fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    pub fn up_by(self, n: i32) -> Self {
        self.offset(0, n, 0)
    }

    pub fn down_by(self, n: i32) -> Self {
        self.offset(0, -n, 0)
    }

    /// Squared euclidean distance between the two lattice points.
    pub fn squared_distance(self, other: BlockPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(self, other: BlockPos) -> f64 {
        self.squared_distance(other).sqrt()
    }

    pub fn manhattan_distance(self, other: BlockPos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }

    /// The four horizontal face neighbours, in +x, -x, +z, -z order.
    pub fn horizontal_neighbors(self) -> [BlockPos; 4] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }

    /// The eight cells surrounding this one on the same level.
    pub fn horizontal_ring(self) -> [BlockPos; 8] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
            self.offset(1, 0, 1),
            self.offset(1, 0, -1),
            self.offset(-1, 0, 1),
            self.offset(-1, 0, -1),
        ]
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Squared distance from a continuous position to the center of a block.
pub fn squared_distance_to_center(from: Vec3, pos: BlockPos) -> f64 {
    (pos.center() - from).magnitude2()
}

/// Wraps an angle in degrees into `[-180, 180)`.
pub fn wrap_degrees(angle: f32) -> f32 {
    let mut wrapped = angle % 360.0;
    if wrapped >= 180.0 {
        wrapped -= 360.0;
    }
    if wrapped < -180.0 {
        wrapped += 360.0;
    }
    wrapped
}

/// Facing of an agent in degrees. Yaw 0 looks towards +z, pitch grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

impl Rotation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    /// The rotation that looks from `from` straight at `to`.
    pub fn looking_at(from: Vec3, to: Vec3) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let dz = to.z - from.z;
        let horizontal = (dx * dx + dz * dz).sqrt();
        let yaw = dz.atan2(dx).to_degrees() as f32 - 90.0;
        let pitch = -(dy.atan2(horizontal).to_degrees() as f32);
        Self {
            yaw: wrap_degrees(yaw),
            pitch,
        }
    }

    /// Moves towards `target` by at most `max_step` degrees on each axis.
    ///
    /// # Arguments
    ///
    /// * `target` - The rotation to turn towards.
    /// * `max_step` - Largest change applied to yaw and to pitch.
    ///
    /// # Returns
    ///
    /// The stepped rotation.
    pub fn step_towards(self, target: Rotation, max_step: f32) -> Self {
        let yaw_diff = wrap_degrees(target.yaw - self.yaw).clamp(-max_step, max_step);
        let pitch_diff = (target.pitch - self.pitch).clamp(-max_step, max_step);
        Self {
            yaw: wrap_degrees(self.yaw + yaw_diff),
            pitch: (self.pitch + pitch_diff).clamp(-90.0, 90.0),
        }
    }

    /// Whether both axes are within `tolerance` degrees of `other`.
    pub fn is_close_to(self, other: Rotation, tolerance: f32) -> bool {
        wrap_degrees(other.yaw - self.yaw).abs() < tolerance
            && (other.pitch - self.pitch).abs() < tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_floors_negative_coordinates() {
        let pos = BlockPos::containing(Vec3::new(-0.5, 1.99, 2.0));
        assert_eq!(pos, BlockPos::new(-1, 1, 2));
    }

    #[test]
    fn test_distances() {
        let a = BlockPos::new(0, 0, 0);
        let b = BlockPos::new(3, 4, 0);
        assert_eq!(a.squared_distance(b), 25.0);
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(a.manhattan_distance(b), 7);
    }

    #[test]
    fn test_horizontal_neighbors_stay_on_level() {
        let origin = BlockPos::new(2, 5, -1);
        for n in origin.horizontal_neighbors() {
            assert_eq!(n.y, 5);
            assert_eq!(origin.manhattan_distance(n), 1);
        }
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(45.0), 45.0);
    }

    #[test]
    fn test_looking_at_cardinal_directions() {
        let from = Vec3::new(0.0, 0.0, 0.0);
        let towards_z = Rotation::looking_at(from, Vec3::new(0.0, 0.0, 5.0));
        assert!(towards_z.yaw.abs() < 1e-3);
        assert!(towards_z.pitch.abs() < 1e-3);

        let up = Rotation::looking_at(from, Vec3::new(1.0, 1.0, 0.0));
        assert!((up.pitch + 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_step_towards_is_bounded() {
        let current = Rotation::new(0.0, 0.0);
        let target = Rotation::new(90.0, -30.0);
        let stepped = current.step_towards(target, 2.5);
        assert_eq!(stepped, Rotation::new(2.5, -2.5));
        assert!(!stepped.is_close_to(target, 2.0));
        assert!(target.step_towards(target, 2.5).is_close_to(target, 2.0));
    }
}
