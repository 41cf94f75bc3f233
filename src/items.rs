/// Static game vocabulary shared by the decision engine and the switch sequences.
///
/// Protection prayers, equipment brackets, the offensive prayer policy table and
/// the handful of item ids the hotkey policies branch on. None of this is
/// configurable: the policies are written against these exact items.
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;

/// Equipment slot holding the weapon.
pub const WEAPON_SLOT: &str = "3";
/// Equipment slot the bracket is derived from.
pub const BRACKET_SLOT: &str = "0";
/// Item id the feed uses for an empty slot.
pub const EMPTY_ITEM: i32 = -1;

pub const DARK_BOW:         i32 = 20408;
pub const DRAGON_ARROW:     i32 = 20389;
pub const ELDER_MAUL:       i32 = 21205;
pub const DHAROKS_GREATAXE: i32 = 25516;
pub const VERACS_FLAIL:     i32 = 27189;
pub const GRANITE_MAUL:     i32 = 20557;
pub const MAGES_BOOK:       i32 = 6889;
pub const SPIRIT_SHIELD:    i32 = 23599;
pub const UNHOLY_BOOK:      i32 = 27191;

/// Off-hand defenders; removed automatically when a two-hander is equipped.
pub static DEFENDERS: Lazy<HashSet<i32>> = Lazy::new(|| HashSet::from([23597, 27185]));

/// Weapons the F10 policy treats as special-attack weapons.
pub static SPEC_WEAPONS: Lazy<HashSet<i32>> = Lazy::new(|| HashSet::from([27184, 20593, 20784]));

/// Two-handed weapons the F9 policy swaps to.
pub static TWO_HANDERS: Lazy<HashSet<i32>> =
    Lazy::new(|| HashSet::from([ELDER_MAUL, DHAROKS_GREATAXE, VERACS_FLAIL]));

// ---------------------------------------------------------------------------
// Protection prayers
// ---------------------------------------------------------------------------

/// One of the three mutually exclusive protection prayers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionKind {
    Magic,
    Missiles,
    Melee,
}

impl ProtectionKind {
    /// Order in which the active prayer list is scanned.
    pub const SCAN_ORDER: [ProtectionKind; 3] = [Self::Magic, Self::Missiles, Self::Melee];

    pub fn prayer_name(self) -> &'static str {
        match self {
            Self::Magic    => "protect_from_magic",
            Self::Missiles => "protect_from_missiles",
            Self::Melee    => "protect_from_melee",
        }
    }

    pub fn from_prayer_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::SCAN_ORDER.into_iter().find(|k| k.prayer_name() == name)
    }

    /// Maps an attack-type label from the animation table.
    pub fn from_attack_type(attack_type: &str) -> Option<Self> {
        match attack_type.trim().to_ascii_lowercase().as_str() {
            "magic"  => Some(Self::Magic),
            "ranged" => Some(Self::Missiles),
            "melee"  => Some(Self::Melee),
            _ => None,
        }
    }
}

impl fmt::Display for ProtectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prayer_name())
    }
}

// ---------------------------------------------------------------------------
// Brackets and the offensive prayer policy
// ---------------------------------------------------------------------------

/// Equipment tier, locked from the first item seen in slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    Pure,
    Zerker,
    Max,
}

impl Bracket {
    pub fn from_item(item_id: i32) -> Self {
        match item_id {
            27166 => Self::Pure,
            27169 => Self::Zerker,
            _     => Self::Max,
        }
    }
}

/// Offensive style a hotkey policy boosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackCategory {
    /// piety family
    Melee,
    /// rigour family
    Ranged,
    /// augury family
    Magic,
}

/// Prayers to activate for `category` at `bracket`.
pub fn offensive_prayers(category: AttackCategory, bracket: Bracket) -> &'static [&'static str] {
    use AttackCategory::*;
    use Bracket::*;
    match (category, bracket) {
        (Melee, Max)           => &["piety"],
        (Melee, Zerker | Pure) => &["ultimate_strength", "incredible_reflexes"],
        (Ranged, Max)          => &["rigour"],
        (Ranged, Zerker | Pure) => &["eagle_eye"],
        (Magic, Max)           => &["augury"],
        (Magic, Zerker | Pure) => &["mystic_might"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_defaults_to_max() {
        assert_eq!(Bracket::from_item(27166), Bracket::Pure);
        assert_eq!(Bracket::from_item(27169), Bracket::Zerker);
        assert_eq!(Bracket::from_item(23591), Bracket::Max);
        assert_eq!(Bracket::from_item(4151),  Bracket::Max);
    }

    #[test]
    fn protection_names_are_case_insensitive() {
        assert_eq!(ProtectionKind::from_prayer_name(" Protect_From_Melee "), Some(ProtectionKind::Melee));
        assert_eq!(ProtectionKind::from_prayer_name("piety"), None);
    }

    #[test]
    fn ranged_attacks_map_to_missiles() {
        assert_eq!(ProtectionKind::from_attack_type("ranged"), Some(ProtectionKind::Missiles));
        assert_eq!(ProtectionKind::from_attack_type("typeless"), None);
    }

    #[test]
    fn low_brackets_share_fallback_prayers() {
        assert_eq!(offensive_prayers(AttackCategory::Melee, Bracket::Max), &["piety"]);
        assert_eq!(
            offensive_prayers(AttackCategory::Melee, Bracket::Pure),
            offensive_prayers(AttackCategory::Melee, Bracket::Zerker),
        );
        assert_eq!(offensive_prayers(AttackCategory::Magic, Bracket::Zerker), &["mystic_might"]);
    }
}
