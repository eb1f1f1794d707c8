//! Weighted loot tables - tier-bounded item generation

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::tier::LootTier;

/// A single entry in a tier's item list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootEntry {
    /// Item kind identifier understood by the inventory layer
    pub item: String,
    /// Minimum quantity per drop
    pub min_quantity: u32,
    /// Maximum quantity per drop
    pub max_quantity: u32,
}

/// A generated drop ready to hand to the inventory layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootDrop {
    pub item: String,
    pub quantity: u32,
    pub tier: LootTier,
    /// Rolled enchantment level, 0 when unenchanted
    pub enchant_level: u32,
}

/// Loot table mapping each tier to its configured item entries.
///
/// Entries are appended by configuration; generation draws uniformly
/// within a tier's entries and within each entry's quantity range. A tier
/// with no entries is a setup problem, not a runtime one: generation for
/// it logs a warning and yields nothing rather than failing mid-match.
#[derive(Debug, Clone, Default)]
pub struct LootTable {
    entries: HashMap<LootTier, Vec<LootEntry>>,
}

impl LootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item entry to a tier. Rejects `min > max`.
    pub fn add_loot(
        &mut self,
        tier: LootTier,
        item: impl Into<String>,
        min_quantity: u32,
        max_quantity: u32,
    ) -> bool {
        let item = item.into();
        if min_quantity > max_quantity {
            warn!(
                %tier,
                item,
                min_quantity,
                max_quantity,
                "Rejected loot entry with inverted quantity range"
            );
            return false;
        }

        self.entries.entry(tier).or_default().push(LootEntry {
            item,
            min_quantity,
            max_quantity,
        });
        true
    }

    /// Number of entries configured for a tier
    pub fn entry_count(&self, tier: LootTier) -> usize {
        self.entries.get(&tier).map(Vec::len).unwrap_or(0)
    }

    /// Setup-time check: warns for every tier with no entries and returns
    /// whether the table covers all tiers.
    pub fn validate(&self) -> bool {
        let mut complete = true;
        for tier in LootTier::ALL {
            if self.entry_count(tier) == 0 {
                warn!(%tier, "Loot table has no entries for tier");
                complete = false;
            }
        }
        complete
    }

    /// Generate `count` drops from one tier.
    ///
    /// Returns exactly `count` drops when the tier is configured; an empty
    /// tier yields an empty vec.
    pub fn generate_loot<R: Rng + ?Sized>(
        &self,
        tier: LootTier,
        count: usize,
        rng: &mut R,
    ) -> Vec<LootDrop> {
        let Some(entries) = self.entries.get(&tier).filter(|e| !e.is_empty()) else {
            warn!(%tier, "Loot generation requested for empty tier");
            return Vec::new();
        };

        (0..count)
            .map(|_| {
                let entry = &entries[rng.gen_range(0..entries.len())];
                let quantity = rng.gen_range(entry.min_quantity..=entry.max_quantity);
                LootDrop {
                    item: entry.item.clone(),
                    quantity,
                    tier,
                    enchant_level: roll_enchantment(tier, rng),
                }
            })
            .collect()
    }

    /// Generate `count` drops, each from an independently selected tier
    pub fn generate_mixed_loot<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<LootDrop> {
        (0..count)
            .flat_map(|_| {
                let tier = LootTier::select_random(rng);
                self.generate_loot(tier, 1, rng)
            })
            .collect()
    }

    /// Standard battle-royale table covering every tier
    pub fn default_table() -> Self {
        let mut table = Self::new();
        table.add_loot(LootTier::Common, "wooden_sword", 1, 1);
        table.add_loot(LootTier::Common, "arrow", 4, 12);
        table.add_loot(LootTier::Common, "bread", 2, 5);
        table.add_loot(LootTier::Common, "leather_chestplate", 1, 1);
        table.add_loot(LootTier::Uncommon, "stone_sword", 1, 1);
        table.add_loot(LootTier::Uncommon, "bow", 1, 1);
        table.add_loot(LootTier::Uncommon, "chainmail_chestplate", 1, 1);
        table.add_loot(LootTier::Uncommon, "cooked_beef", 2, 6);
        table.add_loot(LootTier::Rare, "iron_sword", 1, 1);
        table.add_loot(LootTier::Rare, "iron_chestplate", 1, 1);
        table.add_loot(LootTier::Rare, "crossbow", 1, 1);
        table.add_loot(LootTier::Epic, "diamond_sword", 1, 1);
        table.add_loot(LootTier::Epic, "diamond_chestplate", 1, 1);
        table.add_loot(LootTier::Epic, "ender_pearl", 1, 2);
        table.add_loot(LootTier::Legendary, "netherite_sword", 1, 1);
        table.add_loot(LootTier::Legendary, "golden_apple", 1, 2);
        table
    }
}

/// Roll an enchantment for a drop; tiers below Rare never enchant.
fn roll_enchantment<R: Rng + ?Sized>(tier: LootTier, rng: &mut R) -> u32 {
    let max_level = tier.max_enchant_level();
    if max_level == 0 || !rng.gen_bool(tier.enchant_chance()) {
        return 0;
    }
    rng.gen_range(1..=max_level)
}
