//! # Bot Decisions
//!
//! Worker-side logic. A bot only knows its own id and map; everything it
//! learns about the world comes from the [`QueryService`], and every
//! decision is taken against one pinned generation so the answers it
//! combines always agree with each other.

use farsight_core::{
    EntityId, EntityKind, EntitySnapshot, FactionTag, GenerationBuffer, GenerationId, KindSet, MapId, QueryService,
    RadiusQuery, ResultLimit, SnapshotDetail,
};
use farsight_shared::Position;

/// Health fraction below which a bot stops fighting.
pub const FLEE_HEALTH_PCT: f32 = 0.25;

/// How far a bot looks for something to attack.
pub const AGGRO_RADIUS: f32 = 40.0;

/// How far a bot looks for something to loot.
pub const LOOT_RADIUS: f32 = 60.0;

/// Allies counted before a bot commits to a fight.
pub const ALLY_SCAN_LIMIT: usize = 8;

/// What a bot decided to do this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BotAction {
    /// The bot isn't in the cache (dead, despawned, or nothing published).
    Absent,
    /// Standing in a harmful zone: leave it.
    Escape {
        /// Zone to move away from.
        zone: EntityId,
    },
    /// Low on health with enemies around.
    Flee {
        /// Closest threat.
        from: EntityId,
    },
    /// Attack the closest hostile.
    Attack {
        /// Chosen target.
        target: EntityId,
        /// Allies fighting nearby.
        allies: usize,
    },
    /// Walk to an interactable.
    Loot {
        /// Chosen node.
        node: EntityId,
    },
    /// Nothing to do.
    Wander,
}

/// A decision and the generation it was made against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// The action.
    pub action: BotAction,
    /// Generation consulted.
    pub generation: Option<GenerationId>,
}

/// Decision maker for one bot.
#[derive(Clone, Copy, Debug)]
pub struct BotBrain {
    /// The bot's own id.
    pub id: EntityId,
    /// Map the bot lives on.
    pub map: MapId,
}

impl BotBrain {
    /// Creates a brain for a bot.
    #[must_use]
    pub const fn new(id: EntityId, map: MapId) -> Self {
        Self { id, map }
    }

    /// Decides what to do, from one consistent generation.
    #[must_use]
    pub fn decide(&self, queries: &QueryService) -> Decision {
        let map = self.map;
        let id = self.id;

        queries
            .read(|view| {
                let generation = Some(view.generation());
                let Some(me) = view.query_by_id(map, id).copied().filter(|s| s.alive) else {
                    return Decision { action: BotAction::Absent, generation };
                };
                let here = me.position;

                // Harmful zones first: is the bot standing in one?
                let zones = view.query_radius(
                    map,
                    &RadiusQuery::new(here, AGGRO_RADIUS),
                    KindSet::only(EntityKind::AreaEffect),
                    ResultLimit::Nearest(1),
                    |zone| zone_covers(zone, here) && zone_is_hostile(zone, view, map, me.faction),
                );
                if let Some(zone) = zones.first() {
                    return Decision { action: BotAction::Escape { zone: zone.id }, generation };
                }

                let hostile = view.query_radius(
                    map,
                    &RadiusQuery::new(here, AGGRO_RADIUS),
                    KindSet::only(EntityKind::Actor),
                    ResultLimit::Nearest(1),
                    |other| other.alive && other.is_hostile_to(me.faction),
                );
                if let Some(enemy) = hostile.first() {
                    if me.health_pct() < FLEE_HEALTH_PCT {
                        return Decision { action: BotAction::Flee { from: enemy.id }, generation };
                    }
                    let allies = view
                        .query_radius(
                            map,
                            &RadiusQuery::new(here, AGGRO_RADIUS),
                            KindSet::only(EntityKind::Actor),
                            ResultLimit::First(ALLY_SCAN_LIMIT),
                            |other| other.id != id && other.alive && other.faction == me.faction,
                        )
                        .len();
                    return Decision { action: BotAction::Attack { target: enemy.id, allies }, generation };
                }

                let loot = view.query_radius(
                    map,
                    &RadiusQuery::new(here, LOOT_RADIUS),
                    KindSet::only(EntityKind::Interactable),
                    ResultLimit::Nearest(1),
                    |node| matches!(node.detail, SnapshotDetail::Interactable { spawned: true, .. }),
                );
                if let Some(node) = loot.first() {
                    return Decision { action: BotAction::Loot { node: node.id }, generation };
                }

                Decision { action: BotAction::Wander, generation }
            })
            .unwrap_or(Decision { action: BotAction::Absent, generation: None })
    }
}

fn zone_covers(zone: &EntitySnapshot, point: Position) -> bool {
    match zone.detail {
        SnapshotDetail::AreaEffect { radius, .. } => zone.position.planar_distance_squared(point) <= radius * radius,
        _ => false,
    }
}

/// A zone is harmful unless its caster is still known to be friendly.
fn zone_is_hostile(zone: &EntitySnapshot, view: &GenerationBuffer, map: MapId, me: FactionTag) -> bool {
    let SnapshotDetail::AreaEffect { caster, .. } = zone.detail else {
        return false;
    };
    match caster.and_then(|c| view.query_by_id(map, c)) {
        Some(caster) => caster.faction != me || caster.faction == FactionTag::NEUTRAL,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farsight_core::{CacheConfig, DoubleBufferedSnapshots, SpellId};
    use farsight_shared::DistanceMetric;
    use std::sync::Arc;
    use std::time::Instant;

    const MAP: MapId = MapId(3);

    fn publish(snapshots: &[EntitySnapshot]) -> QueryService {
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let mut staging = buffers.begin_build().unwrap();
        for s in snapshots {
            staging.insert(*s).unwrap();
        }
        staging.publish(Instant::now());
        QueryService::new(Arc::clone(&buffers), &CacheConfig::default())
    }

    fn fighter(id: u64, x: f32, faction: u32) -> EntitySnapshot {
        EntitySnapshot::actor(EntityId(id), MAP, Position::new(x, 0.0, 0.0))
            .with_health(100, 100)
            .with_faction(FactionTag(faction))
    }

    #[test]
    fn test_absent_before_publish() {
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let queries = QueryService::new(buffers, &CacheConfig::default());
        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision, Decision { action: BotAction::Absent, generation: None });
    }

    #[test]
    fn test_attacks_nearest_hostile() {
        let queries = publish(&[fighter(1, 0.0, 1), fighter(2, 5.0, 1), fighter(3, 10.0, 2), fighter(4, 20.0, 2)]);
        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision.action, BotAction::Attack { target: EntityId(3), allies: 1 });
        assert_eq!(decision.generation, Some(GenerationId(1)));
    }

    #[test]
    fn test_flees_when_hurt() {
        let queries = publish(&[fighter(1, 0.0, 1).with_health(10, 100), fighter(3, 10.0, 2)]);
        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision.action, BotAction::Flee { from: EntityId(3) });
    }

    #[test]
    fn test_escapes_enemy_zone() {
        let mut zone = EntitySnapshot::area_effect(EntityId(9), MAP, Position::new(2.0, 0.0, 0.0), SpellId(5), 6.0);
        zone.detail = SnapshotDetail::AreaEffect { spell: SpellId(5), caster: Some(EntityId(3)), radius: 6.0 };
        let queries = publish(&[fighter(1, 0.0, 1), fighter(3, 30.0, 2), zone]);

        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision.action, BotAction::Escape { zone: EntityId(9) });
    }

    #[test]
    fn test_ignores_friendly_zone_and_loots() {
        let mut zone = EntitySnapshot::area_effect(EntityId(9), MAP, Position::ORIGIN, SpellId(5), 6.0);
        zone.detail = SnapshotDetail::AreaEffect { spell: SpellId(5), caster: Some(EntityId(2)), radius: 6.0 };
        let queries = publish(&[
            fighter(1, 0.0, 1),
            fighter(2, 3.0, 1),
            zone,
            EntitySnapshot::interactable(EntityId(20), MAP, Position::new(50.0, 0.0, 0.0), 1001),
        ]);

        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision.action, BotAction::Loot { node: EntityId(20) });
    }

    #[test]
    fn test_dead_bot_is_absent() {
        let queries = publish(&[fighter(1, 0.0, 1).dead()]);
        let decision = BotBrain::new(EntityId(1), MAP).decide(&queries);
        assert_eq!(decision.action, BotAction::Absent);
        assert_eq!(decision.generation, Some(GenerationId(1)));
    }
}
