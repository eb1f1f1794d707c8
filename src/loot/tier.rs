//! Loot rarity tiers with fixed selection weights

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Loot rarity tier.
///
/// Selection weights are fixed at 50/30/15/4/1 and sum to exactly 100, so
/// a single uniform roll in `[0, 100)` maps one-to-one onto the tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootTier {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl LootTier {
    /// All tiers in selection order (lowest rarity first)
    pub const ALL: [LootTier; 5] = [
        LootTier::Common,
        LootTier::Uncommon,
        LootTier::Rare,
        LootTier::Epic,
        LootTier::Legendary,
    ];

    /// Selection weight out of 100
    pub const fn weight(self) -> u32 {
        match self {
            Self::Common => 50,
            Self::Uncommon => 30,
            Self::Rare => 15,
            Self::Epic => 4,
            Self::Legendary => 1,
        }
    }

    /// Display color for chat/UI rendering
    pub const fn color(self) -> &'static str {
        match self {
            Self::Common => "gray",
            Self::Uncommon => "green",
            Self::Rare => "blue",
            Self::Epic => "purple",
            Self::Legendary => "gold",
        }
    }

    /// Probability that a generated item of this tier carries an enchantment
    pub const fn enchant_chance(self) -> f64 {
        match self {
            Self::Common | Self::Uncommon => 0.0,
            Self::Rare => 0.05,
            Self::Epic => 0.35,
            Self::Legendary => 0.75,
        }
    }

    /// Upper bound for a rolled enchantment level (0 = never enchanted)
    pub const fn max_enchant_level(self) -> u32 {
        match self {
            Self::Common | Self::Uncommon => 0,
            Self::Rare => 1,
            Self::Epic => 2,
            Self::Legendary => 4,
        }
    }

    /// Select a tier by cumulative-weight inverse CDF.
    ///
    /// A uniform roll in `[0, 100)` falls into Common 0-49, Uncommon 50-79,
    /// Rare 80-94, Epic 95-98, Legendary 99.
    pub fn select_random<R: Rng + ?Sized>(rng: &mut R) -> LootTier {
        let roll = rng.gen_range(0..100u32);
        let mut cumulative = 0;
        for tier in Self::ALL {
            cumulative += tier.weight();
            if roll < cumulative {
                return tier;
            }
        }
        // Unreachable while the weights sum to 100
        LootTier::Common
    }
}

impl std::fmt::Display for LootTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: u32 = LootTier::ALL.iter().map(|t| t.weight()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn enchant_bounds_increase_with_rarity() {
        for pair in LootTier::ALL.windows(2) {
            assert!(pair[1].enchant_chance() >= pair[0].enchant_chance());
            assert!(pair[1].max_enchant_level() >= pair[0].max_enchant_level());
        }
        assert!(LootTier::Legendary.enchant_chance() > LootTier::Epic.enchant_chance());
    }

    #[test]
    fn selection_matches_documented_distribution() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut counts = std::collections::HashMap::new();
        let draws = 100_000;
        for _ in 0..draws {
            *counts.entry(LootTier::select_random(&mut rng)).or_insert(0u32) += 1;
        }

        let fraction = |tier| *counts.get(&tier).unwrap_or(&0) as f64 / draws as f64;
        assert!((0.45..=0.55).contains(&fraction(LootTier::Common)));
        assert!((0.25..=0.35).contains(&fraction(LootTier::Uncommon)));
        assert!((0.10..=0.20).contains(&fraction(LootTier::Rare)));
        assert!((0.02..=0.06).contains(&fraction(LootTier::Epic)));
        assert!((0.005..=0.02).contains(&fraction(LootTier::Legendary)));
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let draw = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..32)
                .map(|_| LootTier::select_random(&mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }
}
