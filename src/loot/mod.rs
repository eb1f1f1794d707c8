//! Loot generation - rarity tiers and weighted item tables

pub mod table;
pub mod tier;

pub use table::{LootDrop, LootEntry, LootTable};
pub use tier::LootTier;
