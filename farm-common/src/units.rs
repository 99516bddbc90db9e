//! Unit vocabulary and troop vectors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Every unit type the game knows, in its canonical column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Spear,
    Sword,
    Axe,
    Archer,
    Spy,
    Light,
    Marcher,
    Heavy,
    Ram,
    Catapult,
    Knight,
    Snob,
    Militia,
}

impl UnitKind {
    pub const COUNT: usize = 13;

    pub const ALL: [UnitKind; UnitKind::COUNT] = [
        UnitKind::Spear,
        UnitKind::Sword,
        UnitKind::Axe,
        UnitKind::Archer,
        UnitKind::Spy,
        UnitKind::Light,
        UnitKind::Marcher,
        UnitKind::Heavy,
        UnitKind::Ram,
        UnitKind::Catapult,
        UnitKind::Knight,
        UnitKind::Snob,
        UnitKind::Militia,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitKind::Spear => "spear",
            UnitKind::Sword => "sword",
            UnitKind::Axe => "axe",
            UnitKind::Archer => "archer",
            UnitKind::Spy => "spy",
            UnitKind::Light => "light",
            UnitKind::Marcher => "marcher",
            UnitKind::Heavy => "heavy",
            UnitKind::Ram => "ram",
            UnitKind::Catapult => "catapult",
            UnitKind::Knight => "knight",
            UnitKind::Snob => "snob",
            UnitKind::Militia => "militia",
        }
    }

    /// Base travel time in minutes per field at world and unit speed 1
    pub fn base_minutes_per_field(self) -> f64 {
        match self {
            UnitKind::Spear | UnitKind::Axe | UnitKind::Archer => 18.0,
            UnitKind::Sword => 22.0,
            UnitKind::Spy => 9.0,
            UnitKind::Light | UnitKind::Marcher | UnitKind::Knight => 10.0,
            UnitKind::Heavy => 11.0,
            UnitKind::Ram | UnitKind::Catapult => 30.0,
            UnitKind::Snob => 35.0,
            UnitKind::Militia => 0.0,
        }
    }

    /// Siege, noble and support-only units never take part in farming
    pub fn is_farm_eligible(self) -> bool {
        !matches!(
            self,
            UnitKind::Ram | UnitKind::Catapult | UnitKind::Snob | UnitKind::Militia
        )
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        UnitKind::ALL
            .into_iter()
            .find(|unit| unit.name() == wanted)
            .ok_or_else(|| format!("unknown unit type: {}", s))
    }
}

/// Per-unit troop counts over the fixed vocabulary.
///
/// Counts are unsigned and the only way to take troops away is
/// [`TroopVector::checked_sub`], so a vector can never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<UnitKind, u32>", into = "BTreeMap<UnitKind, u32>")]
pub struct TroopVector {
    counts: [u32; UnitKind::COUNT],
}

impl TroopVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (UnitKind, u32)>,
    {
        let mut vector = Self::new();
        for (unit, count) in pairs {
            vector.set(unit, count);
        }
        vector
    }

    pub fn get(&self, unit: UnitKind) -> u32 {
        self.counts[unit.index()]
    }

    pub fn set(&mut self, unit: UnitKind, count: u32) {
        self.counts[unit.index()] = count;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Units with a non-zero count, in vocabulary order
    pub fn units(&self) -> impl Iterator<Item = (UnitKind, u32)> + '_ {
        UnitKind::ALL
            .into_iter()
            .map(move |unit| (unit, self.get(unit)))
            .filter(|(_, count)| *count > 0)
    }

    /// Componentwise `self - other`, or `None` if any component would go negative
    pub fn checked_sub(&self, other: &TroopVector) -> Option<TroopVector> {
        let mut counts = [0u32; UnitKind::COUNT];
        for (i, slot) in counts.iter_mut().enumerate() {
            *slot = self.counts[i].checked_sub(other.counts[i])?;
        }
        Some(TroopVector { counts })
    }

    /// Copy with every unit that cannot farm zeroed out
    pub fn farm_eligible(&self) -> TroopVector {
        let mut vector = *self;
        for unit in UnitKind::ALL {
            if !unit.is_farm_eligible() {
                vector.set(unit, 0);
            }
        }
        vector
    }

    /// The required unit with the longest base travel time
    pub fn slowest_unit(&self) -> Option<UnitKind> {
        self.units()
            .map(|(unit, _)| unit)
            .max_by(|a, b| a.base_minutes_per_field().total_cmp(&b.base_minutes_per_field()))
    }
}

impl From<BTreeMap<UnitKind, u32>> for TroopVector {
    fn from(map: BTreeMap<UnitKind, u32>) -> Self {
        TroopVector::from_pairs(map)
    }
}

impl From<TroopVector> for BTreeMap<UnitKind, u32> {
    fn from(vector: TroopVector) -> Self {
        vector.units().collect()
    }
}
