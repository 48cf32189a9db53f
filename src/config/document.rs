//! The six YAML documents the Configuration Store multiplexes over
//! (spec §3 "ConfigurationView").

/// Which YAML document a key path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Catalogs shipped with the tool; immutable at runtime.
    Main,
    /// Per-edition catalogs (Fallout 4 / Skyrim); immutable at runtime.
    Game,
    /// User-editable preferences (`CLASSIC Settings.yaml`).
    Settings,
    /// Discovered paths, user-editable (`CLASSIC <Game> Local.yaml`).
    GameLocal,
    /// User-editable ignore lists (`CLASSIC Ignore.yaml`).
    Ignore,
    /// Fixtures used only by the test suite (`tests/test_settings.yaml`).
    Test,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 6] = [
        DocumentKind::Main,
        DocumentKind::Game,
        DocumentKind::Settings,
        DocumentKind::GameLocal,
        DocumentKind::Ignore,
        DocumentKind::Test,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Main, Game and Test catalogs never change across the life of a
    /// process: loaded once, cached forever, memoized per key.
    pub fn is_immutable(self) -> bool {
        matches!(self, DocumentKind::Main | DocumentKind::Game | DocumentKind::Test)
    }

    pub fn is_mutable(self) -> bool {
        !self.is_immutable()
    }
}
