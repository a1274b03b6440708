//! # Simulated World
//!
//! A stand-in for a game server's entity store: every map's entities behind
//! one coarse lock, mutated by the host loop and enumerated by the cache
//! scheduler. Nothing else may read it.
//!
//! Deterministic for a given seed (`ChaCha8Rng`), so two runs of the swarm
//! with the same arguments see the same world.

use std::collections::BTreeMap;

use farsight_core::{
    AuthoritativeStore, EntityId, EntityKind, EntitySnapshot, EntityVisitor, FactionTag, MapId, SnapshotDetail,
    SpellId, StoreError,
};
use farsight_shared::{Position, Vec3};
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Side length of every simulated map.
pub const MAP_SIZE: f32 = 2048.0;

/// Actor walking speed (units per second).
pub const WALK_SPEED: f32 = 7.0;

/// Lifetime of a spell zone, in world steps.
pub const ZONE_LIFETIME_STEPS: u32 = 200;

/// Steps before a dead actor respawns.
pub const RESPAWN_STEPS: u32 = 100;

/// Factions handed out to actors.
pub const FACTIONS: [FactionTag; 3] = [FactionTag(1), FactionTag(2), FactionTag(3)];

/// One live entity as the world stores it.
#[derive(Clone, Debug)]
pub struct LiveEntity {
    /// Identity.
    pub id: EntityId,
    /// Map it lives on.
    pub map: MapId,
    /// Current position.
    pub position: Position,
    /// Current heading (units per second).
    pub velocity: Vec3,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Hostility tag.
    pub faction: FactionTag,
    /// Current target.
    pub target: Option<EntityId>,
    /// Kind-specific record.
    pub detail: SnapshotDetail,
    /// Steps left until removal (zones) or respawn (dead actors).
    pub timer: u32,
    /// Being removed; the cache must not pick it up.
    pub despawning: bool,
}

impl LiveEntity {
    /// The entity's kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.detail.kind()
    }

    /// Alive (or, for non-actors, present).
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !matches!(self.detail, SnapshotDetail::Actor { .. }) || self.health > 0
    }
}

/// World population parameters.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    /// Number of maps.
    pub maps: u32,
    /// Actors per map.
    pub actors_per_map: u32,
    /// Interactables per map.
    pub interactables_per_map: u32,
    /// Triggers per map.
    pub triggers_per_map: u32,
    /// RNG seed.
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            maps: 4,
            actors_per_map: 2_000,
            interactables_per_map: 300,
            triggers_per_map: 50,
            seed: 42,
        }
    }
}

/// Counters from one world step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Actors that died this step.
    pub deaths: u32,
    /// Actors that respawned this step.
    pub respawns: u32,
    /// Spell zones created this step.
    pub zones_spawned: u32,
    /// Spell zones that expired this step.
    pub zones_expired: u32,
}

struct WorldState {
    maps: BTreeMap<MapId, Vec<LiveEntity>>,
    rng: ChaCha8Rng,
    next_id: u64,
}

/// The authoritative world.
pub struct SimWorld {
    state: RwLock<WorldState>,
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld").field("entities", &self.len()).finish()
    }
}

impl SimWorld {
    /// Creates and populates a world.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let mut state = WorldState {
            maps: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            next_id: 1,
        };

        for m in 0..config.maps {
            let map = MapId(m);
            let mut entities = Vec::new();
            for _ in 0..config.actors_per_map {
                entities.push(state.spawn_actor(map));
            }
            for _ in 0..config.interactables_per_map {
                let id = state.allocate_id();
                let entry = state.rng.gen_range(1_000..1_100);
                let position = state.random_position();
                entities.push(LiveEntity::fixed(
                    id,
                    map,
                    position,
                    SnapshotDetail::Interactable { entry, spawned: true },
                ));
            }
            for _ in 0..config.triggers_per_map {
                let id = state.allocate_id();
                let radius = state.rng.gen_range(5.0..25.0);
                let position = state.random_position();
                entities.push(LiveEntity::fixed(id, map, position, SnapshotDetail::Trigger { radius }));
            }
            state.maps.insert(map, entities);
        }

        Self { state: RwLock::new(state) }
    }

    /// Total entities (any kind, alive or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().maps.values().map(Vec::len).sum()
    }

    /// True if the world holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every actor, as `(map, id)`. Used by the host to hand out bots.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<(MapId, EntityId)> {
        let state = self.state.read();
        state
            .maps
            .iter()
            .flat_map(|(&map, entities)| {
                entities
                    .iter()
                    .filter(|e| e.kind() == EntityKind::Actor)
                    .map(move |e| (map, e.id))
            })
            .collect()
    }

    /// Looks up a live entity directly. For host code only.
    #[must_use]
    pub fn entity(&self, map: MapId, id: EntityId) -> Option<LiveEntity> {
        self.state.read().maps.get(&map)?.iter().find(|e| e.id == id).cloned()
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&self, dt: f32) -> StepReport {
        let mut report = StepReport::default();
        let mut state = self.state.write();
        let WorldState { maps, rng, next_id } = &mut *state;

        for (&map, entities) in maps.iter_mut() {
            let mut new_zones = Vec::new();

            for entity in entities.iter_mut() {
                match entity.detail {
                    SnapshotDetail::Actor { .. } => step_actor(entity, rng, dt, &mut report, &mut new_zones),
                    SnapshotDetail::AreaEffect { .. } => {
                        entity.timer = entity.timer.saturating_sub(1);
                        if entity.timer == 0 {
                            entity.despawning = true;
                        }
                    }
                    SnapshotDetail::Interactable { ref mut spawned, .. } => {
                        if rng.gen_bool(0.001) {
                            *spawned = !*spawned;
                        }
                    }
                    SnapshotDetail::Trigger { .. } => {}
                }
            }

            let before = entities.len();
            entities.retain(|e| !e.despawning);
            report.zones_expired += u32::try_from(before - entities.len()).unwrap_or(u32::MAX);

            for (caster, position) in new_zones {
                let id = EntityId(*next_id);
                *next_id += 1;
                let detail = SnapshotDetail::AreaEffect {
                    spell: SpellId(rng.gen_range(100..110)),
                    caster: Some(caster),
                    radius: rng.gen_range(4.0..12.0),
                };
                let mut zone = LiveEntity::fixed(id, map, position, detail);
                zone.timer = ZONE_LIFETIME_STEPS;
                entities.push(zone);
                report.zones_spawned += 1;
            }
        }

        report
    }
}

fn step_actor(
    entity: &mut LiveEntity,
    rng: &mut ChaCha8Rng,
    dt: f32,
    report: &mut StepReport,
    new_zones: &mut Vec<(EntityId, Position)>,
) {
    if entity.health == 0 {
        entity.timer = entity.timer.saturating_sub(1);
        if entity.timer == 0 {
            entity.health = entity.max_health;
            entity.position = random_position(rng);
            report.respawns += 1;
        }
        return;
    }

    if rng.gen_bool(0.02) {
        entity.velocity = random_heading(rng);
    }
    let moved = entity.position.to_vec3() + entity.velocity * dt;
    entity.position = Position::new(
        moved.x.clamp(0.0, MAP_SIZE),
        moved.y.clamp(0.0, MAP_SIZE),
        moved.z,
    )
    .with_facing(entity.velocity.y.atan2(entity.velocity.x));

    let in_combat = rng.gen_bool(0.05);
    if let SnapshotDetail::Actor { in_combat: ref mut flag, .. } = entity.detail {
        *flag = in_combat;
    }
    if in_combat {
        let damage = rng.gen_range(1..40);
        entity.health = entity.health.saturating_sub(damage);
        if entity.health == 0 {
            entity.timer = RESPAWN_STEPS;
            entity.target = None;
            report.deaths += 1;
        } else if rng.gen_bool(0.01) {
            new_zones.push((entity.id, entity.position));
        }
    } else if entity.health < entity.max_health {
        entity.health = (entity.health + 1).min(entity.max_health);
    }
}

fn random_position(rng: &mut ChaCha8Rng) -> Position {
    Position::new(rng.gen_range(0.0..MAP_SIZE), rng.gen_range(0.0..MAP_SIZE), 0.0)
}

fn random_heading(rng: &mut ChaCha8Rng) -> Vec3 {
    let angle: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec3::new(angle.cos() * WALK_SPEED, angle.sin() * WALK_SPEED, 0.0)
}

impl WorldState {
    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn random_position(&mut self) -> Position {
        random_position(&mut self.rng)
    }

    fn spawn_actor(&mut self, map: MapId) -> LiveEntity {
        let id = self.allocate_id();
        let level: u8 = self.rng.gen_range(1..=60);
        let max_health = 100 + u32::from(level) * 20;
        let is_player = self.rng.gen_bool(0.2);
        let faction = FACTIONS[self.rng.gen_range(0..FACTIONS.len())];
        LiveEntity {
            id,
            map,
            position: self.random_position(),
            velocity: random_heading(&mut self.rng),
            health: max_health,
            max_health,
            faction,
            target: None,
            detail: SnapshotDetail::Actor { is_player, level, in_combat: false },
            timer: 0,
            despawning: false,
        }
    }
}

impl LiveEntity {
    fn fixed(id: EntityId, map: MapId, position: Position, detail: SnapshotDetail) -> Self {
        Self {
            id,
            map,
            position,
            velocity: Vec3::ZERO,
            health: 0,
            max_health: 0,
            faction: FactionTag::NEUTRAL,
            target: None,
            detail,
            timer: 0,
            despawning: false,
        }
    }
}

impl AuthoritativeStore for SimWorld {
    type Entity = LiveEntity;

    fn map_ids(&self) -> Vec<MapId> {
        self.state.read().maps.keys().copied().collect()
    }

    fn enumerate_entities(
        &self,
        map: MapId,
        kind: EntityKind,
        visitor: &mut EntityVisitor<'_, LiveEntity>,
    ) -> Result<(), StoreError> {
        let state = self.state.read();
        let entities = state.maps.get(&map).ok_or(StoreError::MapUnavailable(map))?;
        for entity in entities.iter().filter(|e| e.kind() == kind) {
            if visitor(entity).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn to_snapshot(entity: &LiveEntity) -> Option<EntitySnapshot> {
        if entity.despawning {
            return None;
        }
        let mut snapshot = EntitySnapshot::new(entity.id, entity.map, entity.position, entity.detail)
            .with_health(entity.health, entity.max_health)
            .with_faction(entity.faction)
            .with_target(entity.target);
        snapshot.alive = entity.is_alive();
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> WorldConfig {
        WorldConfig {
            maps: 2,
            actors_per_map: 50,
            interactables_per_map: 10,
            triggers_per_map: 5,
            seed: 7,
        }
    }

    #[test]
    fn test_world_population() {
        let world = SimWorld::new(small());
        assert_eq!(world.len(), 2 * (50 + 10 + 5));
        assert_eq!(world.map_ids(), vec![MapId(0), MapId(1)]);
        assert_eq!(world.actor_ids().len(), 100);
    }

    #[test]
    fn test_same_seed_same_world() {
        let a = SimWorld::new(small());
        let b = SimWorld::new(small());
        for _ in 0..20 {
            assert_eq!(a.step(0.05), b.step(0.05));
        }
        let pa = a.entity(MapId(1), EntityId(70)).map(|e| e.position);
        let pb = b.entity(MapId(1), EntityId(70)).map(|e| e.position);
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_actors_stay_on_map() {
        let world = SimWorld::new(small());
        for _ in 0..200 {
            world.step(0.1);
        }
        let mut visited = 0;
        world
            .enumerate_entities(MapId(0), EntityKind::Actor, &mut |e| {
                assert!((0.0..=MAP_SIZE).contains(&e.position.x));
                assert!((0.0..=MAP_SIZE).contains(&e.position.y));
                visited += 1;
                std::ops::ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(visited, 50);
    }

    #[test]
    fn test_conversion_skips_despawning() {
        let mut zone = LiveEntity::fixed(
            EntityId(1),
            MapId(0),
            Position::ORIGIN,
            SnapshotDetail::AreaEffect { spell: SpellId(1), caster: None, radius: 3.0 },
        );
        assert!(SimWorld::to_snapshot(&zone).is_some());
        zone.despawning = true;
        assert!(SimWorld::to_snapshot(&zone).is_none());
    }

    #[test]
    fn test_dead_actor_snapshot() {
        let mut state = WorldState {
            maps: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(1),
            next_id: 1,
        };
        let mut actor = state.spawn_actor(MapId(0));
        actor.health = 0;
        let snapshot = SimWorld::to_snapshot(&actor).unwrap();
        assert!(!snapshot.alive);
        assert_eq!(snapshot.kind(), EntityKind::Actor);
    }
}
