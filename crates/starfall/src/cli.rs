use starfall_core::{BackupMode, Branch, validate_port};

pub const USAGE: &str = "\
Starfall Launcher

USAGE:
    starfall-launcher [FLAGS]

With no flags the launcher updates the last used branch to its newest
version, then starts the game.

FLAGS:
    -help          Print this help text and exit
    -version       Print the launcher version and exit
    -dev           Use the development branch
    -pre           Use the pre-release branch
    -repair        Reinstall the selected version even when up to date
    -no_backup     Skip the pre-update backup
    -backup_all    Back up the whole install directory, not just game state
    -force         Force the update even when the install is current
    -server        Start a dedicated server instead of the client
    -port:<port>   Server port, 1 to 65535 (required with -server)";

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Options {
    pub show_help: bool,
    pub show_version: bool,
    pub branch: Option<Branch>,
    pub backup_mode: Option<BackupMode>,
    pub repair: bool,
    pub force: bool,
    pub server_port: Option<u16>,
}

impl Options {
    /// Parse raw arguments (without the program name).
    ///
    /// # Errors
    /// Returns a message suitable for direct printing when a flag is
    /// unknown, flags conflict, or `-server` lacks a valid port.
    pub fn parse<'a, I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut options = Self::default();
        let mut server = false;
        let mut port = None;

        for arg in args {
            match arg {
                "-help" | "--help" | "-h" => options.show_help = true,
                "-version" | "--version" => options.show_version = true,
                "-dev" => options.branch = Some(Branch::Dev),
                "-pre" => options.branch = Some(Branch::Pre),
                "-repair" => options.repair = true,
                "-no_backup" => {
                    if options.backup_mode == Some(BackupMode::Everything) {
                        return Err("-no_backup and -backup_all conflict".to_string());
                    }
                    options.backup_mode = Some(BackupMode::None);
                }
                "-backup_all" => {
                    if options.backup_mode == Some(BackupMode::None) {
                        return Err("-no_backup and -backup_all conflict".to_string());
                    }
                    options.backup_mode = Some(BackupMode::Everything);
                }
                "-force" => options.force = true,
                "-server" => server = true,
                _ if arg.starts_with("-port:") => {
                    let raw = &arg["-port:".len()..];
                    port = Some(validate_port(raw).map_err(|e| e.to_string())?);
                }
                _ => return Err(format!("unknown flag: {arg}")),
            }
        }

        if server {
            match port {
                Some(port) => options.server_port = Some(port),
                None => return Err("-server requires -port:<port>".to_string()),
            }
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use starfall_core::{BackupMode, Branch};

    use super::Options;

    #[test]
    fn no_flags_yields_defaults() {
        let options = Options::parse([]).expect("empty args should parse");
        assert_eq!(options, Options::default());
    }

    #[test]
    fn branch_and_backup_flags_parse() {
        let options =
            Options::parse(["-dev", "-no_backup", "-force"]).expect("flags should parse");
        assert_eq!(options.branch, Some(Branch::Dev));
        assert_eq!(options.backup_mode, Some(BackupMode::None));
        assert!(options.force);
        assert!(options.server_port.is_none());
    }

    #[test]
    fn server_mode_requires_a_port() {
        assert!(Options::parse(["-server"]).is_err());
        assert!(Options::parse(["-server", "-port:0"]).is_err());
        assert!(Options::parse(["-server", "-port:nope"]).is_err());

        let options =
            Options::parse(["-server", "-port:4242"]).expect("server with port should parse");
        assert_eq!(options.server_port, Some(4242));
    }

    #[test]
    fn conflicting_backup_flags_are_rejected() {
        assert!(Options::parse(["-no_backup", "-backup_all"]).is_err());
        assert!(Options::parse(["-backup_all", "-no_backup"]).is_err());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let error = Options::parse(["-frobnicate"]).expect_err("unknown flag should fail");
        assert!(error.contains("-frobnicate"));
    }
}
