use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::delta::Entity;

/// Entity states for the current level.
///
/// Every state lives in one arena and is addressed by its slot. The delta
/// source map points entity indices at slots, and the live set names the
/// indices present in the latest snapshot. Neither holds a reference into
/// the arena, so it can grow freely.
#[derive(Debug, Default)]
pub struct Entities {
    arena: Vec<Entity>,
    slots: HashMap<u16, usize>,
    live: BTreeSet<u16>,
    baselines: BTreeMap<u16, Entity>,
    extra_baselines: Vec<Entity>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.slots.clear();
        self.live.clear();
        self.baselines.clear();
        self.extra_baselines.clear();
    }

    pub fn baseline(&self, index: u16) -> Option<&Entity> {
        self.baselines.get(&index)
    }

    pub fn baseline_mut(&mut self, index: u16) -> &mut Entity {
        self.baselines.entry(index).or_default()
    }

    pub fn baselines_len(&self) -> usize {
        self.baselines.len()
    }

    pub fn extra_baseline(&self, index: usize) -> Option<&Entity> {
        self.extra_baselines.get(index)
    }

    pub fn extra_baselines_len(&self) -> usize {
        self.extra_baselines.len()
    }

    pub fn set_extra_baselines(&mut self, extras: Vec<Entity>) {
        self.extra_baselines = extras;
    }

    /// Replaces every delta source with a copy of the baseline pool.
    pub fn seed_from_baselines(&mut self) {
        self.arena.clear();
        self.slots.clear();
        self.live.clear();

        for (&index, baseline) in &self.baselines {
            self.slots.insert(index, self.arena.len());
            self.arena.push(baseline.clone());
        }
    }

    /// Delta source for `index`, allocated on first use.
    pub fn state_mut(&mut self, index: u16) -> &mut Entity {
        let slot = match self.slots.get(&index) {
            Some(&slot) => slot,
            None => {
                let slot = self.arena.len();
                self.arena.push(Entity::default());
                self.slots.insert(index, slot);
                slot
            }
        };
        &mut self.arena[slot]
    }

    pub fn activate(&mut self, index: u16) {
        self.live.insert(index);
    }

    /// Drops `index` from the live set. Returns whether it was present.
    pub fn remove(&mut self, index: u16) -> bool {
        self.live.remove(&index)
    }

    pub fn clear_live(&mut self) {
        self.live.clear();
    }

    pub fn contains(&self, index: u16) -> bool {
        self.live.contains(&index)
    }

    pub fn get(&self, index: u16) -> Option<&Entity> {
        if !self.live.contains(&index) {
            return None;
        }
        self.slots.get(&index).map(|&slot| &self.arena[slot])
    }

    /// Live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Entity)> + '_ {
        self.live
            .iter()
            .filter_map(|index| self.slots.get(index).map(|&slot| (*index, &self.arena[slot])))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
