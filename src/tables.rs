/// Static mapping tables, loaded once at startup, immutable afterwards.
///
/// Four JSON files live next to the client config:
///
///   animation_prayer_mapping.json  animation id → attack type ("melee" / "ranged" / "magic")
///   weapon_speed_mapping.json      animation id → attack cadence in ticks
///   manual_coords_mapping.json     screen coordinates of every clickable target
///   switcher_hotkeys.json          hotkey → wanted items
///
/// The two animation tables accept either a list of records
/// (`[{"animation_id": 5061, "attack_type": "melee"}]`) or a plain map
/// (`{"5061": "melee"}`); both shapes exist in the wild.
///
/// Any missing or malformed table is fatal: nothing else starts without them.
use crate::{config::TablePaths, input::Point, items::ProtectionKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("{name} not found at {}", .path.display())]
    Missing { name: &'static str, path: PathBuf },

    #[error("failed to read {name}: {source}")]
    Io {
        name:   &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {name}: {source}")]
    Parse {
        name:   &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{name}: invalid animation id {key:?}")]
    BadAnimationId { name: &'static str, key: String },
}

// ---------------------------------------------------------------------------
// Hotkeys
// ---------------------------------------------------------------------------

/// Function keys the switcher binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hotkey {
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl Hotkey {
    pub const ALL: [Hotkey; 7] = [
        Self::F6, Self::F7, Self::F8, Self::F9, Self::F10, Self::F11, Self::F12,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::F6  => "F6",
            Self::F7  => "F7",
            Self::F8  => "F8",
            Self::F9  => "F9",
            Self::F10 => "F10",
            Self::F11 => "F11",
            Self::F12 => "F12",
        }
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Hotkey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown hotkey '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Raw JSON shapes (private)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum AnimationKey {
    Int(i64),
    Str(String),
}

#[derive(Deserialize)]
struct AttackTypeRecord {
    animation_id: AnimationKey,
    attack_type:  String,
}

#[derive(Deserialize)]
struct CadenceRecord {
    animation_id: AnimationKey,
    tickrate:     u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrMap<R, V> {
    List(Vec<R>),
    Map(HashMap<String, V>),
}

#[derive(Deserialize)]
struct RawHotkey {
    #[serde(default)]
    items: Vec<WantedItem>,
}

fn parse_animation_id(name: &'static str, key: AnimationKey) -> Result<i32, TableError> {
    match key {
        AnimationKey::Int(v) => i32::try_from(v).map_err(|_| TableError::BadAnimationId {
            name,
            key: v.to_string(),
        }),
        AnimationKey::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| TableError::BadAnimationId { name, key: s }),
    }
}

// ---------------------------------------------------------------------------
// Public tables
// ---------------------------------------------------------------------------

/// Opponent animation knowledge used by the decision engine.
#[derive(Debug, Clone, Default)]
pub struct AnimationTable {
    attack_types: HashMap<i32, String>,
    cadences:     HashMap<i32, u64>,
}

impl AnimationTable {
    pub fn new(attack_types: HashMap<i32, String>, cadences: HashMap<i32, u64>) -> Self {
        Self { attack_types, cadences }
    }

    /// Protection prayer that counters `animation`, if the table knows it.
    pub fn protection_for(&self, animation: i32) -> Option<ProtectionKind> {
        self.attack_types
            .get(&animation)
            .and_then(|t| ProtectionKind::from_attack_type(t))
    }

    /// Attack cadence in ticks; `None` for unknown or zero entries.
    pub fn cadence(&self, animation: i32) -> Option<u64> {
        self.cadences.get(&animation).copied().filter(|&t| t > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpecBarCorners {
    pub top_left:     Point,
    pub top_right:    Point,
    pub bottom_left:  Point,
    pub bottom_right: Point,
}

impl SpecBarCorners {
    pub fn centre(&self) -> Point {
        let corners = [self.top_left, self.top_right, self.bottom_left, self.bottom_right];
        Point {
            x: corners.iter().map(|p| p.x).sum::<i32>() / 4,
            y: corners.iter().map(|p| p.y).sum::<i32>() / 4,
        }
    }
}

/// Screen coordinates of everything a sequence clicks.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordTable {
    #[serde(default)]
    pub prayers:   HashMap<String, Point>,
    /// Keyed by inventory slot index as a string ("0".."27").
    #[serde(default)]
    pub inventory: HashMap<String, Point>,
    #[serde(default)]
    pub spells:    HashMap<String, Point>,
    pub spec_bar:  SpecBarCorners,
}

impl CoordTable {
    pub fn prayer(&self, name: &str) -> Option<Point> {
        self.prayers.get(name).copied()
    }

    pub fn inventory_slot(&self, slot: &str) -> Option<Point> {
        self.inventory.get(slot).copied()
    }

    pub fn spell(&self, name: &str) -> Option<Point> {
        self.spells.get(name).copied()
    }
}

/// One item a hotkey wants equipped. `slot` is the equipment slot it lands
/// in, when known (3 = weapon).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WantedItem {
    pub id:   i32,
    #[serde(default)]
    pub slot: Option<u8>,
}

impl WantedItem {
    pub fn new(id: i32) -> Self {
        Self { id, slot: None }
    }

    pub fn is_weapon(&self) -> bool {
        self.slot == Some(3)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotkeyTable {
    loadouts: HashMap<Hotkey, Vec<WantedItem>>,
}

impl HotkeyTable {
    pub fn new(loadouts: HashMap<Hotkey, Vec<WantedItem>>) -> Self {
        Self { loadouts }
    }

    pub fn contains(&self, hotkey: Hotkey) -> bool {
        self.loadouts.contains_key(&hotkey)
    }

    /// Wanted items for `hotkey`; empty when unbound.
    pub fn items(&self, hotkey: Hotkey) -> Vec<WantedItem> {
        self.loadouts.get(&hotkey).cloned().unwrap_or_default()
    }
}

/// Everything loaded from disk at startup.
#[derive(Debug, Clone)]
pub struct Tables {
    pub animations: AnimationTable,
    pub coords:     CoordTable,
    pub hotkeys:    HotkeyTable,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn read_json<T: serde::de::DeserializeOwned>(name: &'static str, path: &Path) -> Result<T, TableError> {
    if !path.is_file() {
        return Err(TableError::Missing { name, path: path.to_path_buf() });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| TableError::Io { name, source })?;
    serde_json::from_str(&raw).map_err(|source| TableError::Parse { name, source })
}

fn load_attack_types(path: &Path) -> Result<HashMap<i32, String>, TableError> {
    const NAME: &str = "animation_prayer_mapping.json";
    match read_json::<ListOrMap<AttackTypeRecord, String>>(NAME, path)? {
        ListOrMap::List(records) => records
            .into_iter()
            .map(|r| Ok((parse_animation_id(NAME, r.animation_id)?, r.attack_type)))
            .collect(),
        ListOrMap::Map(map) => map
            .into_iter()
            .map(|(k, v)| Ok((parse_animation_id(NAME, AnimationKey::Str(k))?, v)))
            .collect(),
    }
}

fn load_cadences(path: &Path) -> Result<HashMap<i32, u64>, TableError> {
    const NAME: &str = "weapon_speed_mapping.json";
    match read_json::<ListOrMap<CadenceRecord, u64>>(NAME, path)? {
        ListOrMap::List(records) => records
            .into_iter()
            .map(|r| Ok((parse_animation_id(NAME, r.animation_id)?, r.tickrate)))
            .collect(),
        ListOrMap::Map(map) => map
            .into_iter()
            .map(|(k, v)| Ok((parse_animation_id(NAME, AnimationKey::Str(k))?, v)))
            .collect(),
    }
}

fn load_hotkeys(path: &Path) -> Result<HotkeyTable, TableError> {
    let raw: HashMap<String, RawHotkey> = read_json("switcher_hotkeys.json", path)?;
    let mut loadouts = HashMap::new();
    for (key, entry) in raw {
        match key.parse::<Hotkey>() {
            Ok(hotkey) => {
                loadouts.insert(hotkey, entry.items);
            }
            Err(e) => tracing::warn!("switcher_hotkeys.json: {}; entry ignored", e),
        }
    }
    Ok(HotkeyTable::new(loadouts))
}

/// Load all four tables. Fails on the first missing or malformed file.
pub fn load(paths: &TablePaths) -> Result<Tables, TableError> {
    let animations = AnimationTable::new(
        load_attack_types(&paths.animation_prayer)?,
        load_cadences(&paths.weapon_speed)?,
    );
    let coords: CoordTable = read_json("manual_coords_mapping.json", &paths.coords)?;
    let hotkeys = load_hotkeys(&paths.hotkeys)?;

    tracing::info!(
        "Tables loaded: {} attack types, {} cadences, {} prayer coords, {} hotkeys",
        animations.attack_types.len(),
        animations.cadences.len(),
        coords.prayers.len(),
        hotkeys.loadouts.len(),
    );

    Ok(Tables { animations, coords, hotkeys })
}
