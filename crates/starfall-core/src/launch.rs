use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::info;
use thiserror::Error;

use starfall_platform::OsFamily;

use crate::runtime::{RuntimeProvisioner, RuntimeSpec};

/// Main game archive inside the install directory.
pub const GAME_JAR: &str = "Starfall.jar";

/// Fixed initial heap; only the maximum is user-configurable.
const INITIAL_HEAP_MB: u32 = 1024;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{GAME_JAR} not found in {0}")]
    MissingGameJar(PathBuf),
    #[error("runtime executable not found at {0}")]
    MissingRuntime(PathBuf),
    #[error("invalid port {0}: expected a number between 1 and 65535")]
    InvalidPort(String),
    #[error("failed to spawn game process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Parse a user-supplied port, accepting only 1..=65535.
///
/// # Errors
/// Returns [`LaunchError::InvalidPort`] for non-numeric or zero input.
pub fn validate_port(raw: &str) -> Result<u16, LaunchError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(LaunchError::InvalidPort(raw.to_string())),
    }
}

/// Whether the install directory holds a launchable game build.
#[must_use]
pub fn game_jar_exists(install_dir: &Path) -> bool {
    install_dir.join(GAME_JAR).is_file()
}

/// Fully resolved launch invocation.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    /// Spawn the game with inherited stdio so its output shares the
    /// launcher's terminal.
    ///
    /// # Errors
    /// Returns an error when the process cannot be started.
    pub fn spawn(&self) -> Result<tokio::process::Child, LaunchError> {
        info!(
            "Launching {} {}",
            self.program.display(),
            self.args.join(" ")
        );
        tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(LaunchError::Spawn)
    }
}

/// Assembles the game's command line from the runtime, memory settings,
/// user arguments, and client/server mode.
pub struct LaunchCommandBuilder {
    install_dir: PathBuf,
    runtime: RuntimeSpec,
    os: OsFamily,
    memory_mb: u32,
    extra_args: String,
    server_port: Option<u16>,
}

impl LaunchCommandBuilder {
    #[must_use]
    pub fn new(install_dir: &Path, runtime: RuntimeSpec, os: OsFamily) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            runtime,
            os,
            memory_mb: 4096,
            extra_args: String::new(),
            server_port: None,
        }
    }

    #[must_use]
    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Free-form user arguments, whitespace-separated.
    #[must_use]
    pub fn extra_args(mut self, args: &str) -> Self {
        self.extra_args = args.to_string();
        self
    }

    /// Start a dedicated server listening on `port` instead of the client.
    #[must_use]
    pub fn server_port(mut self, port: Option<u16>) -> Self {
        self.server_port = port;
        self
    }

    /// Resolve the final command line.
    ///
    /// # Errors
    /// Returns an error when the game archive or the runtime executable is
    /// missing from the install directory.
    pub fn build(self) -> Result<LaunchCommand, LaunchError> {
        if !game_jar_exists(&self.install_dir) {
            return Err(LaunchError::MissingGameJar(self.install_dir));
        }
        let program = RuntimeProvisioner::runtime_path(&self.install_dir, &self.runtime);
        if !program.is_file() {
            return Err(LaunchError::MissingRuntime(program));
        }

        let mut args = Vec::new();
        args.extend(self.runtime.flags.iter().map(ToString::to_string));
        // Graphics init must happen on the process main thread on macOS;
        // the flag has to precede -jar.
        if self.os.needs_main_thread_graphics() {
            args.push("-XstartOnFirstThread".to_string());
        }
        args.push("-jar".to_string());
        args.push(GAME_JAR.to_string());
        // Everything past the archive name reaches the game's own argument
        // handling: user args first, then heap sizing, then the launch mode.
        // Heap sizing is owned by the memory setting; user args must not
        // override it.
        args.extend(
            self.extra_args
                .split_whitespace()
                .filter(|a| !a.starts_with("-Xms") && !a.starts_with("-Xmx"))
                .map(ToString::to_string),
        );
        args.push(format!("-Xms{INITIAL_HEAP_MB}m"));
        args.push(format!("-Xmx{}m", self.memory_mb));
        args.push("-force".to_string());
        if let Some(port) = self.server_port {
            args.push("-server".to_string());
            args.push(format!("-port:{port}"));
        }

        Ok(LaunchCommand {
            program,
            args,
            working_dir: self.install_dir,
        })
    }
}
