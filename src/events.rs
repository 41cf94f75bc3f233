/// Decodes raw feed messages into typed `FeedEvent`s.
///
/// The game-side plugin pushes JSON text frames shaped like:
///
///   {"type": "equipment_changed", "data": {"items": {"0": {"item_id": 27166}, ...}}}
///
/// `type` selects the variant and `data` carries the payload. A few event
/// names have an older spelling that some plugin builds still emit
/// (`tick_state`, `prayers`, `opponent`, `recommended_protection_prayer`);
/// those are accepted as aliases.
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Typed feed events the state store merges.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    Tick(TickData),
    #[serde(alias = "tick_state")]
    FullSync(Box<FullSync>),
    InventoryChanged(SlotItems),
    EquipmentChanged(SlotItems),
    TabChanged(TabData),
    #[serde(alias = "prayers")]
    TogglesChanged(Vec<ActivePrayer>),
    #[serde(alias = "opponent")]
    OpponentChanged(Option<Opponent>),
    #[serde(alias = "recommended_protection_prayer")]
    ProtectionHint(HintData),
    SpecBar(serde_json::Value),
}

impl FeedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tick(_)             => "tick",
            Self::FullSync(_)         => "full_sync",
            Self::InventoryChanged(_) => "inventory_changed",
            Self::EquipmentChanged(_) => "equipment_changed",
            Self::TabChanged(_)       => "tab_changed",
            Self::TogglesChanged(_)   => "toggles_changed",
            Self::OpponentChanged(_)  => "opponent_changed",
            Self::ProtectionHint(_)   => "protection_hint",
            Self::SpecBar(_)          => "spec_bar",
        }
    }
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub item_id:  i32,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// UI panel currently open in the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Tab {
    Inventory,
    Prayer,
    Spellbook,
    Attack,
    Other(String),
}

impl From<String> for Tab {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inventory" => Self::Inventory,
            "prayer"    => Self::Prayer,
            "spellbook" => Self::Spellbook,
            "attack"    => Self::Attack,
            _ => Self::Other(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivePrayer {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Opponent {
    #[serde(default)]
    pub name:      Option<String>,
    #[serde(default)]
    pub animation: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WorldPoint {
    pub x:     i32,
    pub y:     i32,
    #[serde(default)]
    pub plane: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickData {
    #[serde(default)]
    pub tick:           Option<u64>,
    #[serde(default)]
    pub tick_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotItems {
    #[serde(default)]
    pub items: Option<HashMap<String, Item>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TabData {
    #[serde(default)]
    pub tab: Option<Tab>,
}

/// The hint arrives either bare or wrapped in `{"recommended_prayer": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HintData {
    Wrapped { recommended_prayer: Option<String> },
    Bare(Option<String>),
}

impl HintData {
    pub fn into_inner(self) -> Option<String> {
        match self {
            Self::Wrapped { recommended_prayer } => recommended_prayer,
            Self::Bare(hint) => hint,
        }
    }
}

/// Coarse snapshot sent on every game tick. Absent keys keep the current
/// value; an explicit `null` clears the optional ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullSync {
    #[serde(default)]
    pub tick:                          Option<u64>,
    #[serde(default)]
    pub tick_timestamp:                Option<i64>,
    #[serde(default)]
    pub inventory_slots:               Option<HashMap<String, Item>>,
    #[serde(default)]
    pub equipment_slots:               Option<HashMap<String, Item>>,
    #[serde(default)]
    pub tab:                           Option<Tab>,
    #[serde(default)]
    pub prayers:                       Option<Vec<ActivePrayer>>,
    #[serde(default, deserialize_with = "present")]
    pub opponent:                      Option<Option<Opponent>>,
    #[serde(default)]
    pub spec_bar:                      Option<serde_json::Value>,
    #[serde(default)]
    pub spells:                        Option<serde_json::Value>,
    #[serde(default)]
    pub canvas_width:                  Option<u32>,
    #[serde(default)]
    pub canvas_height:                 Option<u32>,
    /// Not merged: a full sync without a hint means "no hint".
    #[serde(default)]
    pub recommended_protection_prayer: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub player_world_position:         Option<Option<WorldPoint>>,
}

/// Distinguishes `"key": null` (Some(None)) from a missing key (None).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Decode one feed message. Unknown event types and malformed payloads are
/// logged at debug level and skipped.
pub fn parse_event(raw: &str) -> Option<FeedEvent> {
    match serde_json::from_str::<FeedEvent>(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("Skipping feed message: {} ({} bytes)", e, raw.len());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tick() {
        let e = parse_event(r#"{"type":"tick","data":{"tick":812,"tick_timestamp":1700000000123}}"#)
            .expect("should parse");
        match e {
            FeedEvent::Tick(t) => {
                assert_eq!(t.tick, Some(812));
                assert_eq!(t.tick_timestamp, Some(1_700_000_000_123));
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn accepts_legacy_full_sync_name() {
        let raw = r#"{"type":"tick_state","data":{
            "tick": 5,
            "equipment_slots": {"0": {"item_id": 27166}},
            "tab": "Prayer",
            "opponent": null
        }}"#;
        let FeedEvent::FullSync(sync) = parse_event(raw).expect("should parse") else {
            panic!("expected full sync");
        };
        assert_eq!(sync.tick, Some(5));
        assert_eq!(sync.tab, Some(Tab::Prayer));
        assert_eq!(sync.opponent, Some(None), "explicit null clears the opponent");
        assert!(sync.player_world_position.is_none(), "absent key keeps the old value");
        assert!(sync.recommended_protection_prayer.is_none());
    }

    #[test]
    fn protection_hint_bare_or_wrapped() {
        let bare = parse_event(r#"{"type":"protection_hint","data":"protect_from_magic"}"#).unwrap();
        let wrapped = parse_event(
            r#"{"type":"recommended_protection_prayer","data":{"recommended_prayer":"protect_from_melee"}}"#,
        )
        .unwrap();
        match (bare, wrapped) {
            (FeedEvent::ProtectionHint(a), FeedEvent::ProtectionHint(b)) => {
                assert_eq!(a.into_inner().as_deref(), Some("protect_from_magic"));
                assert_eq!(b.into_inner().as_deref(), Some("protect_from_melee"));
            }
            other => panic!("Wrong variants: {:?}", other),
        }
    }

    #[test]
    fn prayers_alias_carries_a_list() {
        let e = parse_event(r#"{"type":"prayers","data":[{"name":"piety"},{"name":"protect_from_melee"}]}"#)
            .unwrap();
        let FeedEvent::TogglesChanged(list) = e else { panic!("expected toggles") };
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "protect_from_melee");
    }

    #[test]
    fn unknown_tab_is_kept_verbatim() {
        let e = parse_event(r#"{"type":"tab_changed","data":{"tab":"quests"}}"#).unwrap();
        let FeedEvent::TabChanged(t) = e else { panic!("expected tab") };
        assert_eq!(t.tab, Some(Tab::Other("quests".into())));
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_event("not json").is_none());
        assert!(parse_event(r#"{"type":"chat","data":{}}"#).is_none());
        assert!(parse_event("").is_none());
    }
}
