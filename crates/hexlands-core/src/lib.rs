//! Hexlands - rules engine for a hex-grid trading and building game
//!
//! This crate holds everything about a game that does not involve a network:
//! - Hex coordinates and the board graph (hexes, vertices, edges, ports)
//! - Curated and seeded balanced-random board presets
//! - Public game state and per-player private state
//! - The rules engine, a pure `apply` transition returning private deltas
//! - Longest-road evaluation
//! - Public and private snapshots for viewers
//!
//! # Architecture
//!
//! The engine never mutates its input and never logs. It takes an injected
//! random number generator, so a seeded run is fully reproducible. The
//! server crate owns the mutable room state and applies each [`rules::Outcome`].
//!
//! # Modules
//!
//! - [`hex`]: axial coordinates and pixel geometry
//! - [`board`]: board graph generation from a layout
//! - [`presets`]: curated layouts and the seeded token solver
//! - [`game`]: public game state and errors
//! - [`rules`]: action validation and state transitions
//! - [`removal`]: removing a player mid-game
//! - [`snapshot`]: viewer projections

pub mod actions;
pub mod board;
pub mod events;
pub mod game;
pub mod hex;
pub mod longest_road;
pub mod presets;
pub mod private;
pub mod removal;
pub mod resources;
pub mod rules;
pub mod snapshot;

// Re-export commonly used types
pub use actions::{Action, OfferResponse, TradeTarget};
pub use board::{generate, Board, BoardError, LayoutSpec, PortKind, Terrain};
pub use events::{ActiveEvent, EventKind};
pub use game::{
    DiceProfile, Game, GameError, GameMode, GameSettings, HouseRules, LogEntry, LogKind,
    NewGameOptions, Phase, PlayerId, StructureKind, Subphase, TradeOffer, TradeStatus, Variants,
};
pub use longest_road::{compute_award, longest_road_for_player, LongestRoadAward};
pub use presets::{preset_definition, PresetDefinition, PresetMeta, PRESETS};
pub use private::{apply_deltas, DevCard, PrivateDelta, PrivateState, PrivateStates};
pub use removal::remove_player;
pub use resources::{Resource, ResourceCounts};
pub use rules::{apply, Outcome};
pub use snapshot::{private_snapshot, public_snapshot, Hints, PrivateSnapshot, PublicGameSnapshot};
