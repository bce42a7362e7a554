//! Core value types for character motion
//!
//! ## Table of Contents
//! - **CharacterId**: Opaque handle keying every per-character collection
//! - **Vector3 / Position / Rotation**: Immutable geometry primitives
//! - **Direction**: Normalized input-facing intent, convertible to a Rotation
//! - **MotionState**: Immutable kinematic snapshot of one character
//! - **PhysicsInput / CollisionInfo**: Layer physics input and collision report

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Vectors shorter than this resolve to the default direction
const MIN_DIRECTION_LENGTH: f32 = 1e-4;

/// Unique identifier for a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(Uuid);

impl CharacterId {
    /// Create a new random CharacterId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CharacterId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "char-{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for CharacterId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

/// Plain 3D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    /// The zero vector
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };
    /// Unit +Z, the fallback facing for degenerate directions
    pub const UNIT_Z: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Unit-length copy, or `fallback` when the vector is degenerate or non-finite
    pub fn normalize_or(&self, fallback: Vector3) -> Self {
        if !self.is_finite() {
            return fallback;
        }
        let length = self.length();
        if length > MIN_DIRECTION_LENGTH {
            Self::new(self.x / length, self.y / length, self.z / length)
        } else {
            fallback
        }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Absolute location in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// World origin
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// New position displaced by the given offsets
    pub fn offset(&self, dx: f32, dy: f32, dz: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Linear interpolation, `factor` 0 yields `self`, 1 yields `other`
    pub fn lerp(&self, other: &Position, factor: f32) -> Self {
        Self::new(
            lerp(self.x, other.x, factor),
            lerp(self.y, other.y, factor),
            lerp(self.z, other.z, factor),
        )
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x={:.2}, y={:.2}, z={:.2})", self.x, self.y, self.z)
    }
}

/// Orientation as Euler angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    /// No rotation
    pub const IDENTITY: Rotation = Rotation { pitch: 0.0, yaw: 0.0, roll: 0.0 };

    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Per-component linear interpolation
    pub fn lerp(&self, other: &Rotation, factor: f32) -> Self {
        Self::new(
            lerp(self.pitch, other.pitch, factor),
            lerp(self.yaw, other.yaw, factor),
            lerp(self.roll, other.roll, factor),
        )
    }

    /// Horizontal unit heading for this yaw (`x = cos yaw`, `z = sin yaw`)
    pub fn heading(&self) -> Vector3 {
        let yaw = self.yaw.to_radians();
        Vector3::new(yaw.cos(), 0.0, yaw.sin())
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pitch={:.2}, yaw={:.2}, roll={:.2})", self.pitch, self.yaw, self.roll)
    }
}

/// Normalized movement intent
///
/// Construction never fails: zero-length or non-finite vectors resolve to +Z
/// so no NaN can reach a [`Rotation`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction(Vector3);

impl Direction {
    /// Direction used when the input vector is degenerate
    pub const DEFAULT: Direction = Direction(Vector3::UNIT_Z);

    /// Normalize `vector` into a direction
    pub fn new(vector: Vector3) -> Self {
        Self(vector.normalize_or(Vector3::UNIT_Z))
    }

    /// Direction from Euler angles in degrees
    pub fn from_rotation(pitch: f32, yaw: f32) -> Self {
        let (pitch, yaw) = (pitch.to_radians(), yaw.to_radians());
        Self::new(Vector3::new(
            pitch.cos() * yaw.cos(),
            pitch.sin(),
            pitch.cos() * yaw.sin(),
        ))
    }

    /// The unit vector
    pub fn vector(&self) -> Vector3 {
        self.0
    }

    /// Facing rotation: yaw = atan2(z, x), pitch = asin(y), roll = 0
    pub fn to_rotation(&self) -> Rotation {
        let v = self.0;
        let yaw = v.z.atan2(v.x).to_degrees();
        let pitch = v.y.clamp(-1.0, 1.0).asin().to_degrees();
        Rotation::new(pitch, yaw, 0.0)
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Vector3> for Direction {
    fn from(vector: Vector3) -> Self {
        Self::new(vector)
    }
}

/// Pose components of a candidate that still hold the committed values
///
/// Set by the pipeline for the duration of a fold. Layers that add an
/// oscillating offset remove their previously committed offset only from
/// carried components; a replaced component (keyframe pose, new heading) is a
/// fresh base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseCarry {
    /// Vertical position
    pub height: bool,
    /// Pitch and roll
    pub tilt: bool,
}

impl PoseCarry {
    /// Compare a candidate with the committed state it was built from
    pub fn between(candidate: &MotionState, committed: &MotionState) -> Self {
        Self {
            height: candidate.position.y == committed.position.y,
            tilt: candidate.rotation.pitch == committed.rotation.pitch
                && candidate.rotation.roll == committed.rotation.roll,
        }
    }
}

/// Immutable kinematic snapshot of one character
///
/// Every transition produces a new value; the `with_*` methods return copies.
/// `speed` is expected to be non-negative: the pipeline treats a layer that
/// produces a negative or non-finite state as faulty.
///
/// Equality compares the kinematic fields and timestamp; the fold-time
/// [`PoseCarry`] is ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionState {
    character_id: CharacterId,
    position: Position,
    rotation: Rotation,
    speed: f32,
    timestamp: u64,
    #[serde(skip)]
    carry: PoseCarry,
}

impl PartialEq for MotionState {
    fn eq(&self, other: &Self) -> bool {
        self.character_id == other.character_id
            && self.position == other.position
            && self.rotation == other.rotation
            && self.speed == other.speed
            && self.timestamp == other.timestamp
    }
}

impl MotionState {
    /// Create a new state with logical timestamp 0
    pub fn new(character_id: CharacterId, position: Position, rotation: Rotation, speed: f32) -> Self {
        Self {
            character_id,
            position,
            rotation,
            speed,
            timestamp: 0,
            carry: PoseCarry::default(),
        }
    }

    /// Rest state: origin, no rotation, zero speed
    pub fn rest(character_id: CharacterId) -> Self {
        Self::new(character_id, Position::ORIGIN, Rotation::IDENTITY, 0.0)
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Logical timestamp assigned when the state entered a pipeline run
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Which pose components still hold the committed pose during a fold
    pub fn carry(&self) -> PoseCarry {
        self.carry
    }

    pub fn is_moving(&self) -> bool {
        self.speed > 0.0
    }

    /// Same position, rotation and speed; timestamps may differ
    pub fn same_motion(&self, other: &MotionState) -> bool {
        self.position == other.position && self.rotation == other.rotation && self.speed == other.speed
    }

    pub fn with_position(self, position: Position) -> Self {
        Self { position, ..self }
    }

    pub fn with_rotation(self, rotation: Rotation) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_pose(self, position: Position, rotation: Rotation) -> Self {
        Self { position, rotation, ..self }
    }

    pub fn with_speed(self, speed: f32) -> Self {
        Self { speed, ..self }
    }

    pub fn with_timestamp(self, timestamp: u64) -> Self {
        Self { timestamp, ..self }
    }

    pub(crate) fn with_carry(self, carry: PoseCarry) -> Self {
        Self { carry, ..self }
    }

    /// Copy moved `distance` units along the horizontal heading of its yaw
    pub fn advanced(self, distance: f32) -> Self {
        let heading = self.rotation.heading();
        let position = self.position.offset(heading.x * distance, 0.0, heading.z * distance);
        self.with_position(position)
    }

    /// Contract check used by the pipeline: finite components, speed >= 0
    pub fn satisfies_contract(&self) -> bool {
        self.position.is_finite()
            && self.rotation.is_finite()
            && self.speed.is_finite()
            && self.speed >= 0.0
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MotionState({}, pos={}, rot={}, speed={:.2}, t={})",
            self.character_id, self.position, self.rotation, self.speed, self.timestamp
        )
    }
}

/// Input to a layer's physics step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsInput {
    pub position: Position,
    pub rotation: Rotation,
    pub speed: f32,
    pub delta_seconds: f32,
    pub velocity: Vector3,
    pub acceleration: Vector3,
}

impl PhysicsInput {
    /// Physics input for a state moving along its heading with no external acceleration
    pub fn from_state(state: &MotionState, delta_seconds: f32) -> Self {
        Self {
            position: state.position(),
            rotation: state.rotation(),
            speed: state.speed(),
            delta_seconds,
            velocity: state.rotation().heading().scale(state.speed()),
            acceleration: Vector3::ZERO,
        }
    }

    /// Apply the physics result onto the identity/timestamp of `state`
    pub fn into_state(self, state: &MotionState) -> MotionState {
        state.with_pose(self.position, self.rotation).with_speed(self.speed)
    }
}

/// Obstruction reported by a layer's collision check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionInfo {
    /// Contact point
    pub point: Position,
    /// Radius of the obstruction
    pub radius: f32,
}

impl CollisionInfo {
    pub fn new(point: Position, radius: f32) -> Self {
        Self { point, radius }
    }
}

impl fmt::Display for CollisionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} r={:.2}", self.point, self.radius)
    }
}

/// Scalar linear interpolation
pub(crate) fn lerp(start: f32, end: f32, factor: f32) -> f32 {
    start + (end - start) * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_character_id_display() {
        let id = CharacterId::new();
        assert!(format!("{}", id).starts_with("char-"));
    }

    #[test]
    fn test_direction_to_rotation_axes() {
        let east = Direction::new(Vector3::new(1.0, 0.0, 0.0)).to_rotation();
        assert!(approx(east.yaw, 0.0));
        assert!(approx(east.pitch, 0.0));
        assert_eq!(east.roll, 0.0);

        let north = Direction::new(Vector3::new(0.0, 0.0, 5.0)).to_rotation();
        assert!(approx(north.yaw, 90.0));

        let up = Direction::new(Vector3::new(0.0, 2.0, 0.0)).to_rotation();
        assert!(approx(up.pitch, 90.0));
        assert_eq!(up.roll, 0.0);
    }

    #[test]
    fn test_direction_matches_formulas() {
        let v = Vector3::new(1.0, 1.0, -2.0);
        let dir = Direction::new(v);
        let n = dir.vector();
        let rot = dir.to_rotation();
        assert!(approx(n.length(), 1.0));
        assert!(approx(rot.yaw, n.z.atan2(n.x).to_degrees()));
        assert!(approx(rot.pitch, n.y.asin().to_degrees()));
        assert_eq!(rot.roll, 0.0);
    }

    #[test]
    fn test_degenerate_direction_defaults_to_unit_z() {
        for v in [
            Vector3::ZERO,
            Vector3::new(1e-6, 0.0, 0.0),
            Vector3::new(f32::NAN, 1.0, 0.0),
            Vector3::new(f32::INFINITY, 0.0, 0.0),
        ] {
            let dir = Direction::new(v);
            assert_eq!(dir, Direction::DEFAULT);
            let rot = dir.to_rotation();
            assert!(rot.is_finite());
            assert!(approx(rot.yaw, 90.0));
            assert!(approx(rot.pitch, 0.0));
        }
    }

    #[test]
    fn test_direction_from_rotation_round_trip() {
        let dir = Direction::from_rotation(20.0, -45.0);
        let rot = dir.to_rotation();
        assert!(approx(rot.pitch, 20.0));
        assert!(approx(rot.yaw, -45.0));
    }

    #[test]
    fn test_motion_state_is_replaced_not_mutated() {
        let id = CharacterId::new();
        let rest = MotionState::rest(id);
        let moving = rest.with_speed(2.0).with_timestamp(7);
        assert_eq!(rest.speed(), 0.0);
        assert_eq!(moving.speed(), 2.0);
        assert_eq!(moving.timestamp(), 7);
        assert_eq!(moving.character_id(), id);
    }

    #[test]
    fn test_advanced_follows_yaw() {
        let state = MotionState::rest(CharacterId::new()).with_rotation(Rotation::new(0.0, 90.0, 0.0));
        let moved = state.advanced(2.0);
        assert!(approx(moved.position().x, 0.0));
        assert!(approx(moved.position().z, 2.0));
    }

    #[test]
    fn test_pose_carry_tracks_replaced_components() {
        let committed = MotionState::rest(CharacterId::new())
            .with_position(Position::new(0.0, 0.05, 0.0))
            .with_rotation(Rotation::new(1.5, 0.0, -2.0));

        let carried = PoseCarry::between(&committed.with_speed(1.0), &committed);
        assert!(carried.height && carried.tilt);

        let turned = committed.with_rotation(Rotation::new(0.0, 90.0, 0.0));
        let carry = PoseCarry::between(&turned, &committed);
        assert!(carry.height);
        assert!(!carry.tilt);

        let keyframe = committed.with_pose(Position::ORIGIN, Rotation::IDENTITY);
        assert_eq!(PoseCarry::between(&keyframe, &committed), PoseCarry::default());
    }

    #[test]
    fn test_equality_ignores_carry() {
        let state = MotionState::rest(CharacterId::new());
        let flagged = state.with_carry(PoseCarry { height: true, tilt: true });
        assert_eq!(state, flagged);
        assert!(state.same_motion(&flagged.with_timestamp(9)));
        assert_ne!(state, flagged.with_timestamp(9));
    }

    #[test]
    fn test_contract_check() {
        let state = MotionState::rest(CharacterId::new());
        assert!(state.satisfies_contract());
        assert!(!state.with_speed(-1.0).satisfies_contract());
        assert!(!state.with_position(Position::new(f32::NAN, 0.0, 0.0)).satisfies_contract());
    }
}
