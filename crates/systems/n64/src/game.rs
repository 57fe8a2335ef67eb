//! Title identification from the header game id.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    Usa,
    Japan,
    Europe,
}

/// A recognized title and region.
///
/// Serialized as the 4-character game id found at header offset 0x3B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Game {
    #[serde(rename = "NLBE")]
    Mp1Usa,
    #[serde(rename = "NLBJ")]
    Mp1Jpn,
    #[serde(rename = "NLBP")]
    Mp1Pal,
    #[serde(rename = "NMWE")]
    Mp2Usa,
    #[serde(rename = "NMWJ")]
    Mp2Jpn,
    #[serde(rename = "NMWP")]
    Mp2Pal,
    #[serde(rename = "NMVE")]
    Mp3Usa,
    #[serde(rename = "NMVJ")]
    Mp3Jpn,
    #[serde(rename = "NMVP")]
    Mp3Pal,
}

impl Game {
    pub const ALL: [Game; 9] = [
        Game::Mp1Usa,
        Game::Mp1Jpn,
        Game::Mp1Pal,
        Game::Mp2Usa,
        Game::Mp2Jpn,
        Game::Mp2Pal,
        Game::Mp3Usa,
        Game::Mp3Jpn,
        Game::Mp3Pal,
    ];

    pub fn from_id(id: &[u8; 4]) -> Option<Self> {
        Game::ALL.into_iter().find(|game| game.id().as_bytes() == id)
    }

    pub fn id(self) -> &'static str {
        match self {
            Game::Mp1Usa => "NLBE",
            Game::Mp1Jpn => "NLBJ",
            Game::Mp1Pal => "NLBP",
            Game::Mp2Usa => "NMWE",
            Game::Mp2Jpn => "NMWJ",
            Game::Mp2Pal => "NMWP",
            Game::Mp3Usa => "NMVE",
            Game::Mp3Jpn => "NMVJ",
            Game::Mp3Pal => "NMVP",
        }
    }

    /// Which title of the series (1, 2 or 3)
    pub fn generation(self) -> u8 {
        match self {
            Game::Mp1Usa | Game::Mp1Jpn | Game::Mp1Pal => 1,
            Game::Mp2Usa | Game::Mp2Jpn | Game::Mp2Pal => 2,
            Game::Mp3Usa | Game::Mp3Jpn | Game::Mp3Pal => 3,
        }
    }

    pub fn region(self) -> Region {
        match self {
            Game::Mp1Usa | Game::Mp2Usa | Game::Mp3Usa => Region::Usa,
            Game::Mp1Jpn | Game::Mp2Jpn | Game::Mp3Jpn => Region::Japan,
            Game::Mp1Pal | Game::Mp2Pal | Game::Mp3Pal => Region::Europe,
        }
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.id(), self.region())
    }
}
