//! Bundled scenarios, themes and lobby constants.

use hexlands_core::{DiceProfile, GameMode, PresetMeta, Variants, PRESETS};
use serde::Serialize;

pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LEN: usize = 5;

pub const PLAYER_COLORS: [&str; 6] = ["red", "blue", "white", "orange", "green", "brown"];

pub const MIN_PLAYERS: u32 = 3;
pub const MAX_PLAYERS: u32 = 6;
pub const DEFAULT_MAX_PLAYERS: u32 = 4;

pub const MAX_PLAYER_NAME_CHARS: usize = 24;
pub const MAX_BOARD_SEED_CHARS: usize = 64;

pub const EMOTES: [&str; 3] = ["nice", "ouch", "gg"];
pub const EMOTE_COOLDOWN_MS: u64 = 850;

pub const DEFAULT_SCENARIO_ID: &str = "classic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: &'static str,
    pub name: &'static str,
}

pub const THEMES: [Theme; 6] = [
    Theme {
        id: "aurora",
        name: "Aurora",
    },
    Theme {
        id: "ember",
        name: "Ember",
    },
    Theme {
        id: "ocean",
        name: "Ocean",
    },
    Theme {
        id: "classic-night",
        name: "Classic Night",
    },
    Theme {
        id: "neon-arcade",
        name: "Neon Arcade",
    },
    Theme {
        id: "deep-sea",
        name: "Deep Sea",
    },
];

/// A bundle of lobby settings applied in one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rules_summary: &'static str,
    pub preset_id: &'static str,
    pub game_mode: GameMode,
    pub theme_id: &'static str,
    pub dice_profile: DiceProfile,
    pub event_deck_enabled: bool,
}

impl Scenario {
    pub fn variants(&self) -> Variants {
        Variants {
            event_deck_enabled: self.event_deck_enabled,
            ..Variants::default()
        }
    }
}

pub const SCENARIOS: [Scenario; 5] = [
    Scenario {
        id: "classic",
        name: "Classic",
        description: "Standard rules • Balanced board • First to 10 VP.",
        rules_summary: "Classic • 10 VP • Standard dice.",
        preset_id: "classic-balanced",
        game_mode: GameMode::Classic,
        theme_id: "aurora",
        dice_profile: DiceProfile::Standard,
        event_deck_enabled: false,
    },
    Scenario {
        id: "quick",
        name: "Quick",
        description: "Shorter game • Balanced board • First to 8 VP.",
        rules_summary: "Quick • 8 VP • Standard dice.",
        preset_id: "classic-balanced",
        game_mode: GameMode::Quick,
        theme_id: "ember",
        dice_profile: DiceProfile::Standard,
        event_deck_enabled: false,
    },
    Scenario {
        id: "traders-paradise",
        name: "Trader's Paradise",
        description: "Port-rich board built for deals.",
        rules_summary: "Classic • 10 VP • Trade-heavy board.",
        preset_id: "trade-heavy",
        game_mode: GameMode::Classic,
        theme_id: "ocean",
        dice_profile: DiceProfile::Standard,
        event_deck_enabled: false,
    },
    Scenario {
        id: "high-conflict",
        name: "High Conflict",
        description: "Brick and wood rush with more robber rolls.",
        rules_summary: "Classic • 10 VP • More 7s.",
        preset_id: "high-brick-wood",
        game_mode: GameMode::Classic,
        theme_id: "ember",
        dice_profile: DiceProfile::HighConflict,
        event_deck_enabled: false,
    },
    Scenario {
        id: "party-mode",
        name: "Party Mode",
        description: "Random board with table events every few turns.",
        rules_summary: "Classic • 10 VP • Event deck on.",
        preset_id: "random-balanced",
        game_mode: GameMode::Classic,
        theme_id: "aurora",
        dice_profile: DiceProfile::Standard,
        event_deck_enabled: true,
    },
];

pub fn scenario(id: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.id == id)
}

pub fn is_known_theme(id: &str) -> bool {
    THEMES.iter().any(|t| t.id == id)
}

/// Everything a client needs to render lobby pickers
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub presets: &'static [PresetMeta],
    pub scenarios: &'static [Scenario],
    pub themes: &'static [Theme],
}

pub fn catalog() -> Catalog {
    Catalog {
        presets: &PRESETS,
        scenarios: &SCENARIOS,
        themes: &THEMES,
    }
}
