//! Grid-based adjacency for the connectivity engine.
//!
//! Entities are placed on 2D grid tiles, each with a set of connectors
//! (north/east/south/west), a rotation, and an open/closed state. Several
//! entities may share a tile, e.g. a pipe and a wire running through the
//! same cell. [`GridLinker`] turns that layout into edges: two nodes touch
//! when their hosts sit on neighbouring tiles with connectors facing each
//! other and the nodes share a graph prototype.

use conduit_core::engine::EngineError;
use conduit_core::id::EntityId;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::BTreeMap;

pub mod linker;
pub use linker::GridLinker;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A position on the 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another position.
    pub fn manhattan_distance(&self, other: &GridPosition) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The neighbouring tile in `dir`.
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    /// The direction of `other` if it is one of the four neighbours.
    pub fn direction_to(self, other: GridPosition) -> Option<Direction> {
        Direction::all().into_iter().find(|&dir| self.step(dir) == other)
    }
}

/// Rotation applied to an entity's connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90 degrees clockwise.
    Cw90,
    /// 180 degrees.
    Cw180,
    /// 270 degrees clockwise (90 degrees counter-clockwise).
    Cw270,
}

impl Rotation {
    /// All four rotation values.
    pub fn all() -> [Rotation; 4] {
        [
            Rotation::None,
            Rotation::Cw90,
            Rotation::Cw180,
            Rotation::Cw270,
        ]
    }

    /// Rotate 90 degrees clockwise.
    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    /// Rotate 90 degrees counter-clockwise.
    pub fn rotate_ccw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw270,
            Rotation::Cw90 => Rotation::None,
            Rotation::Cw180 => Rotation::Cw90,
            Rotation::Cw270 => Rotation::Cw180,
        }
    }

    /// Number of clockwise quarter turns.
    pub fn quarter_turns(self) -> u8 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 1,
            Rotation::Cw180 => 2,
            Rotation::Cw270 => 3,
        }
    }
}

/// Cardinal directions, in clockwise order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four cardinal directions.
    pub fn all() -> [Direction; 4] {
        [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ]
    }

    /// Offset for this direction. North is negative y.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        self.rotated(Rotation::Cw180)
    }

    /// This direction after applying `rotation`.
    pub fn rotated(self, rotation: Rotation) -> Self {
        let index = (self as u8 + rotation.quarter_turns()) % 4;
        Direction::all()[index as usize]
    }
}

/// The sides of a tile an entity connects through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorMask(u8);

impl ConnectorMask {
    pub const NONE: Self = Self(0);
    pub const NORTH: Self = Self(1 << 0);
    pub const EAST: Self = Self(1 << 1);
    pub const SOUTH: Self = Self(1 << 2);
    pub const WEST: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);
    /// A straight segment running north-south.
    pub const STRAIGHT: Self = Self(Self::NORTH.0 | Self::SOUTH.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn from_direction(dir: Direction) -> Self {
        Self(1 << dir as u8)
    }

    pub fn from_directions(dirs: impl IntoIterator<Item = Direction>) -> Self {
        dirs.into_iter()
            .fold(Self::NONE, |mask, dir| mask | Self::from_direction(dir))
    }

    pub fn connects(self, dir: Direction) -> bool {
        self.0 & Self::from_direction(dir).0 != 0
    }

    /// Connected directions, clockwise from north.
    pub fn directions(self) -> impl Iterator<Item = Direction> {
        Direction::all()
            .into_iter()
            .filter(move |&dir| self.connects(dir))
    }

    /// The mask after applying `rotation`.
    pub fn rotated(self, rotation: Rotation) -> Self {
        let turns = rotation.quarter_turns();
        if turns == 0 {
            return self;
        }
        Self(((self.0 << turns) | (self.0 >> (4 - turns))) & Self::ALL.0)
    }
}

impl std::ops::BitOr for ConnectorMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Errors from spatial operations.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error("entity {0:?} is not placed on the grid")]
    NotPlaced(EntityId),
    #[error("entity {0:?} is already placed on the grid")]
    AlreadyPlaced(EntityId),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Where and how one entity sits on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub position: GridPosition,
    /// Connectors before rotation.
    pub connectors: ConnectorMask,
    pub rotation: Rotation,
    /// A closed entity (a shut valve, an open breaker) still touches its
    /// neighbours but never unions their graphs.
    pub open: bool,
}

impl Placement {
    pub fn new(position: GridPosition, connectors: ConnectorMask) -> Self {
        Self {
            position,
            connectors,
            rotation: Rotation::None,
            open: true,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn closed(mut self) -> Self {
        self.open = false;
        self
    }

    /// Connectors after rotation.
    pub fn effective_connectors(&self) -> ConnectorMask {
        self.connectors.rotated(self.rotation)
    }
}

// ---------------------------------------------------------------------------
// SpatialIndex
// ---------------------------------------------------------------------------

/// A spatial index mapping grid tiles to the entities placed on them.
///
/// Maintains a bidirectional mapping:
/// - `tiles`: position -> entities on that tile, in placement order
/// - `placements`: entity -> placement
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tiles: BTreeMap<GridPosition, Vec<EntityId>>,
    placements: SecondaryMap<EntityId, Placement>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Placement --

    /// Place an entity on the grid.
    pub fn place(&mut self, entity: EntityId, placement: Placement) -> Result<(), SpatialError> {
        if self.placements.contains_key(entity) {
            return Err(SpatialError::AlreadyPlaced(entity));
        }
        self.tiles.entry(placement.position).or_default().push(entity);
        self.placements.insert(entity, placement);
        Ok(())
    }

    /// Remove an entity from the grid. Returns its last placement.
    pub fn remove(&mut self, entity: EntityId) -> Result<Placement, SpatialError> {
        let placement = self
            .placements
            .remove(entity)
            .ok_or(SpatialError::NotPlaced(entity))?;
        if let Some(occupants) = self.tiles.get_mut(&placement.position) {
            occupants.retain(|&e| e != entity);
            if occupants.is_empty() {
                self.tiles.remove(&placement.position);
            }
        }
        Ok(placement)
    }

    /// Move an entity to another tile. Returns the tile it left.
    pub fn move_to(&mut self, entity: EntityId, position: GridPosition) -> Result<GridPosition, SpatialError> {
        let mut placement = self.remove(entity)?;
        let previous = placement.position;
        placement.position = position;
        self.place(entity, placement)?;
        Ok(previous)
    }

    pub fn set_rotation(&mut self, entity: EntityId, rotation: Rotation) -> Result<(), SpatialError> {
        self.placement_mut(entity)?.rotation = rotation;
        Ok(())
    }

    pub fn set_connectors(&mut self, entity: EntityId, connectors: ConnectorMask) -> Result<(), SpatialError> {
        self.placement_mut(entity)?.connectors = connectors;
        Ok(())
    }

    /// Open or close an entity. Returns the previous state.
    pub fn set_open(&mut self, entity: EntityId, open: bool) -> Result<bool, SpatialError> {
        let placement = self.placement_mut(entity)?;
        Ok(std::mem::replace(&mut placement.open, open))
    }

    fn placement_mut(&mut self, entity: EntityId) -> Result<&mut Placement, SpatialError> {
        self.placements
            .get_mut(entity)
            .ok_or(SpatialError::NotPlaced(entity))
    }

    // -- Point queries --

    pub fn placement(&self, entity: EntityId) -> Option<&Placement> {
        self.placements.get(entity)
    }

    pub fn position_of(&self, entity: EntityId) -> Option<GridPosition> {
        self.placements.get(entity).map(|p| p.position)
    }

    /// Entities on a tile, in placement order.
    pub fn entities_at(&self, pos: GridPosition) -> &[EntityId] {
        self.tiles.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_occupied(&self, pos: GridPosition) -> bool {
        self.tiles.contains_key(&pos)
    }

    // -- Area queries --

    /// Every entity within an axis-aligned rectangle (inclusive).
    pub fn entities_in_rect(&self, min: GridPosition, max: GridPosition) -> Vec<EntityId> {
        self.tiles
            .range(min..=max)
            .filter(|(pos, _)| pos.y >= min.y && pos.y <= max.y)
            .flat_map(|(_, entities)| entities.iter().copied())
            .collect()
    }

    // -- Adjacency --

    /// Entities on neighbouring tiles whose connectors face this entity's
    /// connectors, with the direction they lie in.
    pub fn connected_neighbors(&self, entity: EntityId) -> Vec<(Direction, EntityId)> {
        let Some(here) = self.placements.get(entity) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        for dir in here.effective_connectors().directions() {
            for &other in self.entities_at(here.position.step(dir)) {
                if self.connects_back(other, dir) {
                    result.push((dir, other));
                }
            }
        }
        result
    }

    /// Whether `entity` has a connector facing back along `dir`.
    fn connects_back(&self, entity: EntityId, dir: Direction) -> bool {
        self.placements
            .get(entity)
            .is_some_and(|p| p.effective_connectors().connects(dir.opposite()))
    }

    // -- Stats --

    /// Number of entities placed on the grid.
    pub fn entity_count(&self) -> usize {
        self.placements.len()
    }

    /// Number of occupied tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}
