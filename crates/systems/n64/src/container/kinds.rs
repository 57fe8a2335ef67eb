//! The four containers a title can carry, and their on-ROM layouts.
//!
//! | Container | Nesting | Sentinels | Entries | Align (entry/dir) |
//! |---|---|---|---|---|
//! | main asset store | nested | none | typed | 4 / 16 |
//! | string table (titles 1-2) | flat | entry | bare | 1 / 16 |
//! | string table (title 3) | nested | none | typed | 4 / 4 |
//! | background store | nested | directory + entry | bare | 1 / 4 |
//! | animation-tile store | nested | directory | typed | 4 / 4 |

use super::layout::{ContainerLayout, EntryFormat, Nesting};
use crate::game::Game;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContainerId {
    /// Main asset store: models, sprites, code blobs, board data
    #[serde(rename = "mainfs")]
    MainFs,
    /// Localized message text
    #[serde(rename = "strings")]
    Strings,
    /// Board background images, one directory per background
    #[serde(rename = "hvqfs")]
    Hvq,
    /// Animated background tiles, one directory per tile set
    #[serde(rename = "animationfs")]
    Animation,
}

/// Main asset store: a directory table of compressed files.
pub const MAINFS_LAYOUT: ContainerLayout = ContainerLayout {
    nesting: Nesting::Nested,
    dir_sentinel: false,
    entries: EntryFormat::Typed,
    entry_align: 4,
    dir_align: 16,
};

/// String table of the first two titles: one flat list of raw strings,
/// each running up to the next offset.
pub const STRINGS_FLAT_LAYOUT: ContainerLayout = ContainerLayout {
    nesting: Nesting::Flat,
    dir_sentinel: false,
    entries: EntryFormat::Bare,
    entry_align: 1,
    dir_align: 16,
};

/// String table of the third title: one compressed directory per locale.
pub const STRINGS_NESTED_LAYOUT: ContainerLayout = ContainerLayout {
    nesting: Nesting::Nested,
    dir_sentinel: false,
    entries: EntryFormat::Typed,
    entry_align: 4,
    dir_align: 4,
};

/// Background store. The background count includes an end offset, and
/// each background's encoded pieces run up to the next offset.
pub const HVQFS_LAYOUT: ContainerLayout = ContainerLayout {
    nesting: Nesting::Nested,
    dir_sentinel: true,
    entries: EntryFormat::Bare,
    entry_align: 1,
    dir_align: 4,
};

/// Animation-tile store. The set count includes an end offset; tiles
/// carry typed headers like main asset store files.
pub const ANIMATIONFS_LAYOUT: ContainerLayout = ContainerLayout {
    nesting: Nesting::Nested,
    dir_sentinel: true,
    entries: EntryFormat::Typed,
    entry_align: 4,
    dir_align: 4,
};

impl ContainerId {
    /// Order containers are laid out and packed in. Fixed for every title.
    pub const PACK_ORDER: [ContainerId; 4] = [
        ContainerId::MainFs,
        ContainerId::Strings,
        ContainerId::Hvq,
        ContainerId::Animation,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ContainerId::MainFs => 0,
            ContainerId::Strings => 1,
            ContainerId::Hvq => 2,
            ContainerId::Animation => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContainerId::MainFs => "mainfs",
            ContainerId::Strings => "strings",
            ContainerId::Hvq => "hvqfs",
            ContainerId::Animation => "animationfs",
        }
    }

    /// Layout this container uses in `game` unless configured otherwise.
    pub fn default_layout(self, game: Game) -> ContainerLayout {
        match self {
            ContainerId::MainFs => MAINFS_LAYOUT,
            ContainerId::Strings if game.generation() >= 3 => STRINGS_NESTED_LAYOUT,
            ContainerId::Strings => STRINGS_FLAT_LAYOUT,
            ContainerId::Hvq => HVQFS_LAYOUT,
            ContainerId::Animation => ANIMATIONFS_LAYOUT,
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
