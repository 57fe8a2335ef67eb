//! Per-title patch configuration.
//!
//! A [`Catalog`] maps each supported [`Game`] to the data the handler needs
//! to find and relocate its containers. It is plain data, loaded from JSON
//! or built in code, and handed to the handler behind an `Arc`.

use crate::container::{ContainerId, ContainerLayout};
use crate::game::Game;
use crate::overlay::OverlayTableConfig;
use crate::patch::PatchOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where one container lives and how it is laid out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Code locations holding the container's ROM offset. The first entry
    /// is authoritative when reading.
    pub offsets: Vec<PatchOffset>,
    /// Overrides the title's default layout for this container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<ContainerLayout>,
}

/// A named directory/entry slot holding a title-specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSlot {
    pub container: ContainerId,
    pub dir: usize,
    pub entry: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchConfig {
    pub game: Game,
    #[serde(default)]
    pub containers: BTreeMap<ContainerId, ContainerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlays: Option<OverlayTableConfig>,
    #[serde(default)]
    pub asset_slots: BTreeMap<String, AssetSlot>,
}

impl PatchConfig {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            containers: BTreeMap::new(),
            overlays: None,
            asset_slots: BTreeMap::new(),
        }
    }

    pub fn layout_for(&self, id: ContainerId) -> ContainerLayout {
        self.containers
            .get(&id)
            .and_then(|c| c.layout)
            .unwrap_or_else(|| id.default_layout(self.game))
    }
}

/// Patch configurations of every supported title.
///
/// Serialized as a list of [`PatchConfig`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PatchConfig>", into = "Vec<PatchConfig>")]
pub struct Catalog {
    titles: BTreeMap<Game, PatchConfig>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Add or replace the configuration for `config.game`.
    pub fn insert(&mut self, config: PatchConfig) {
        self.titles.insert(config.game, config);
    }

    pub fn get(&self, game: Game) -> Option<&PatchConfig> {
        self.titles.get(&game)
    }

    pub fn games(&self) -> impl Iterator<Item = Game> + '_ {
        self.titles.keys().copied()
    }
}

impl From<Vec<PatchConfig>> for Catalog {
    fn from(configs: Vec<PatchConfig>) -> Self {
        let mut catalog = Catalog::new();
        for config in configs {
            catalog.insert(config);
        }
        catalog
    }
}

impl From<Catalog> for Vec<PatchConfig> {
    fn from(catalog: Catalog) -> Self {
        catalog.titles.into_values().collect()
    }
}
