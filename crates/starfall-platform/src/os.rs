use std::fmt;
use std::path::PathBuf;

/// Operating-system family the launcher is running on.
///
/// The game ships a bundled Java runtime per OS family; the relative path of
/// the runtime executable inside the install directory differs between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
}

impl OsFamily {
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Relative path of the bundled runtime executable for the given runtime
    /// major version, resolved against the install directory.
    #[must_use]
    pub fn runtime_executable(self, major: u32) -> PathBuf {
        match self {
            Self::Linux => PathBuf::from(format!("jre{major}/bin/java")),
            Self::MacOs => PathBuf::from(format!("jre{major}/Contents/Home/bin/java")),
            Self::Windows => PathBuf::from(format!("jre{major}/bin/java.exe")),
        }
    }

    /// macOS requires OpenGL contexts to be created on the first thread, so
    /// the launch command must carry a thread-affinity flag there.
    #[must_use]
    pub fn needs_main_thread_graphics(self) -> bool {
        matches!(self, Self::MacOs)
    }

    /// Short token used in runtime download URLs.
    #[must_use]
    pub fn archive_token(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "Linux"),
            Self::MacOs => write!(f, "macOS"),
            Self::Windows => write!(f, "Windows"),
        }
    }
}
