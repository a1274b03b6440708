//! # Entity Snapshots
//!
//! A snapshot is a plain value copy of the fields a query needs for one
//! entity at one point in time. It holds no pointer, handle or borrow into
//! the authoritative store, so a snapshot can outlive the entity it was
//! taken from without any risk.
//!
//! ## Kinds
//!
//! The set of kinds is closed and known up front. Each kind carries its own
//! record shape in [`SnapshotDetail`]; the kind itself is derived from that
//! tag rather than stored twice.
//!
//! ```text
//! EntitySnapshot
//! ├── id / map / position / health / faction / target / casting / flags
//! └── detail ──┬── Actor        { is_player, level, in_combat }
//!              ├── Interactable { entry, spawned }
//!              ├── AreaEffect   { spell, caster, radius }
//!              └── Trigger      { radius }
//! ```

use std::fmt;

use farsight_shared::Position;
use serde::{Deserialize, Serialize};

/// Stable identity of an entity. Opaque to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a map (one independent world partition).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a spell being cast or sustained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpellId(pub u32);

/// Faction / hostility tag.
///
/// [`FactionTag::NEUTRAL`] is hostile to nobody. Two different non-neutral
/// tags are hostile to each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionTag(pub u32);

impl FactionTag {
    /// Neutral: never hostile.
    pub const NEUTRAL: Self = Self(0);

    /// Whether `self` and `other` would fight.
    #[inline]
    #[must_use]
    pub const fn is_hostile_to(self, other: Self) -> bool {
        self.0 != Self::NEUTRAL.0 && other.0 != Self::NEUTRAL.0 && self.0 != other.0
    }
}

/// The closed set of entity kinds the cache partitions by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Mobile actor: players and creatures.
    Actor,
    /// Static interactable object.
    Interactable,
    /// Transient area-effect zone.
    AreaEffect,
    /// Trigger volume.
    Trigger,
}

impl EntityKind {
    /// Number of kinds.
    pub const COUNT: usize = 4;

    /// All kinds, in grid order.
    pub const ALL: [Self; Self::COUNT] = [Self::Actor, Self::Interactable, Self::AreaEffect, Self::Trigger];

    /// Dense index of this kind, `0..COUNT`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    const fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// A set of [`EntityKind`]s, used to filter queries and enable population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KindSet(u8);

impl KindSet {
    /// No kinds.
    pub const EMPTY: Self = Self(0);

    /// Every kind.
    pub const ALL: Self = Self(0b1111);

    /// Set holding a single kind.
    #[inline]
    #[must_use]
    pub const fn only(kind: EntityKind) -> Self {
        Self(kind.bit())
    }

    /// Adds a kind.
    #[inline]
    #[must_use]
    pub const fn with(self, kind: EntityKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: EntityKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// True if no kind is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the member kinds in grid order.
    pub fn iter(self) -> impl Iterator<Item = EntityKind> {
        EntityKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<EntityKind> for KindSet {
    fn from(kind: EntityKind) -> Self {
        Self::only(kind)
    }
}

impl FromIterator<EntityKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = EntityKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Kind-specific part of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotDetail {
    /// Players and creatures.
    Actor {
        /// Controlled by a player (or a player bot).
        is_player: bool,
        /// Character level.
        level: u8,
        /// Currently engaged in combat.
        in_combat: bool,
    },
    /// Chests, nodes, doors, mailboxes...
    Interactable {
        /// Template entry.
        entry: u32,
        /// Present and usable right now.
        spawned: bool,
    },
    /// Persistent ground effect of a spell.
    AreaEffect {
        /// Spell that created the zone.
        spell: SpellId,
        /// Who cast it, if still known.
        caster: Option<EntityId>,
        /// Effect radius.
        radius: f32,
    },
    /// Invisible trigger volume.
    Trigger {
        /// Activation radius.
        radius: f32,
    },
}

impl SnapshotDetail {
    /// The kind tag of this record.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Actor { .. } => EntityKind::Actor,
            Self::Interactable { .. } => EntityKind::Interactable,
            Self::AreaEffect { .. } => EntityKind::AreaEffect,
            Self::Trigger { .. } => EntityKind::Trigger,
        }
    }
}

/// Immutable value copy of one entity.
///
/// Built once by the store's conversion function, stored in exactly one
/// generation, and handed to readers by value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Stable identity.
    pub id: EntityId,
    /// Map the entity is on.
    pub map: MapId,
    /// Where it stands.
    pub position: Position,
    /// Alive at snapshot time.
    pub alive: bool,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Hostility tag.
    pub faction: FactionTag,
    /// What it is targeting.
    pub target: Option<EntityId>,
    /// Spell currently being cast.
    pub casting: Option<SpellId>,
    /// Kind-specific bit flags, opaque to the cache.
    pub flags: u32,
    /// Kind-specific record.
    pub detail: SnapshotDetail,
}

impl EntitySnapshot {
    /// Creates a living, neutral snapshot with no health pool.
    #[must_use]
    pub const fn new(id: EntityId, map: MapId, position: Position, detail: SnapshotDetail) -> Self {
        Self {
            id,
            map,
            position,
            alive: true,
            health: 0,
            max_health: 0,
            faction: FactionTag::NEUTRAL,
            target: None,
            casting: None,
            flags: 0,
            detail,
        }
    }

    /// Creates a non-player actor of level 1 out of combat.
    #[must_use]
    pub const fn actor(id: EntityId, map: MapId, position: Position) -> Self {
        Self::new(
            id,
            map,
            position,
            SnapshotDetail::Actor { is_player: false, level: 1, in_combat: false },
        )
    }

    /// Creates a spawned interactable.
    #[must_use]
    pub const fn interactable(id: EntityId, map: MapId, position: Position, entry: u32) -> Self {
        Self::new(id, map, position, SnapshotDetail::Interactable { entry, spawned: true })
    }

    /// Creates an area-effect zone.
    #[must_use]
    pub const fn area_effect(id: EntityId, map: MapId, position: Position, spell: SpellId, radius: f32) -> Self {
        Self::new(id, map, position, SnapshotDetail::AreaEffect { spell, caster: None, radius })
    }

    /// Creates a trigger volume.
    #[must_use]
    pub const fn trigger(id: EntityId, map: MapId, position: Position, radius: f32) -> Self {
        Self::new(id, map, position, SnapshotDetail::Trigger { radius })
    }

    /// Sets current and maximum health.
    #[must_use]
    pub const fn with_health(mut self, health: u32, max_health: u32) -> Self {
        self.health = health;
        self.max_health = max_health;
        self
    }

    /// Sets the faction.
    #[must_use]
    pub const fn with_faction(mut self, faction: FactionTag) -> Self {
        self.faction = faction;
        self
    }

    /// Sets the current target.
    #[must_use]
    pub const fn with_target(mut self, target: Option<EntityId>) -> Self {
        self.target = target;
        self
    }

    /// Sets the spell being cast.
    #[must_use]
    pub const fn with_casting(mut self, casting: Option<SpellId>) -> Self {
        self.casting = casting;
        self
    }

    /// Sets the kind-specific flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Marks the snapshot as dead.
    #[must_use]
    pub const fn dead(mut self) -> Self {
        self.alive = false;
        self.health = 0;
        self
    }

    /// The kind tag.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.detail.kind()
    }

    /// Health as a fraction of max, `0.0` when there is no health pool.
    #[must_use]
    pub fn health_pct(&self) -> f32 {
        if self.max_health == 0 {
            return 0.0;
        }
        self.health as f32 / self.max_health as f32
    }

    /// Whether this entity would fight something of `faction`.
    #[inline]
    #[must_use]
    pub const fn is_hostile_to(&self, faction: FactionTag) -> bool {
        self.faction.is_hostile_to(faction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_detail() {
        let map = MapId(1);
        let pos = Position::ORIGIN;

        assert_eq!(EntitySnapshot::actor(EntityId(1), map, pos).kind(), EntityKind::Actor);
        assert_eq!(EntitySnapshot::interactable(EntityId(2), map, pos, 7).kind(), EntityKind::Interactable);
        assert_eq!(
            EntitySnapshot::area_effect(EntityId(3), map, pos, SpellId(9), 5.0).kind(),
            EntityKind::AreaEffect
        );
        assert_eq!(EntitySnapshot::trigger(EntityId(4), map, pos, 2.0).kind(), EntityKind::Trigger);
    }

    #[test]
    fn test_kind_set() {
        let set = KindSet::only(EntityKind::Actor).with(EntityKind::Trigger);
        assert!(set.contains(EntityKind::Actor));
        assert!(!set.contains(EntityKind::Interactable));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![EntityKind::Actor, EntityKind::Trigger]);

        assert_eq!(EntityKind::ALL.into_iter().collect::<KindSet>(), KindSet::ALL);
        assert!(KindSet::EMPTY.is_empty());
    }

    #[test]
    fn test_hostility() {
        let horde = FactionTag(2);
        let alliance = FactionTag(1);

        assert!(horde.is_hostile_to(alliance));
        assert!(!horde.is_hostile_to(horde));
        assert!(!FactionTag::NEUTRAL.is_hostile_to(horde));
        assert!(!horde.is_hostile_to(FactionTag::NEUTRAL));
    }

    #[test]
    fn test_health_pct() {
        let s = EntitySnapshot::actor(EntityId(1), MapId(0), Position::ORIGIN).with_health(25, 100);
        assert_eq!(s.health_pct(), 0.25);

        let no_pool = EntitySnapshot::trigger(EntityId(2), MapId(0), Position::ORIGIN, 1.0);
        assert_eq!(no_pool.health_pct(), 0.0);

        let corpse = s.dead();
        assert!(!corpse.alive);
        assert_eq!(corpse.health, 0);
    }
}
