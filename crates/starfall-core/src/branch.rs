use std::fmt;

/// Dev builds older than this year are hidden from the catalog; they predate
/// the current save format and cannot load modern universes.
pub const DEV_BUILD_CUTOFF_YEAR: i32 = 2017;

/// A named release channel with its own version stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Release,
    Dev,
    Pre,
    Archive,
}

impl Branch {
    pub const ALL: [Self; 4] = [Self::Release, Self::Dev, Self::Pre, Self::Archive];

    /// Path of this branch's remote version index, relative to the file
    /// server base URL.
    #[must_use]
    pub fn index_path(self) -> &'static str {
        match self {
            Self::Release => "releasebuildindex",
            Self::Dev => "devbuildindex",
            Self::Pre => "prebuildindex",
            Self::Archive => "archivebuildindex",
        }
    }

    /// Index persisted in the settings document and shown in branch
    /// selection UIs.
    #[must_use]
    pub fn selection_index(self) -> u8 {
        match self {
            Self::Release => 0,
            Self::Dev => 1,
            Self::Pre => 2,
            Self::Archive => 3,
        }
    }

    #[must_use]
    pub fn from_selection_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Release),
            1 => Some(Self::Dev),
            2 => Some(Self::Pre),
            3 => Some(Self::Archive),
            _ => None,
        }
    }

    /// Archive builds are kept for manual download only and are excluded
    /// from automatic catalog refresh.
    #[must_use]
    pub fn refreshed_automatically(self) -> bool {
        !matches!(self, Self::Archive)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "Release"),
            Self::Dev => write!(f, "Dev"),
            Self::Pre => write!(f, "Pre-Release"),
            Self::Archive => write!(f, "Archive"),
        }
    }
}
