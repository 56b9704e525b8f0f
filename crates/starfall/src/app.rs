use std::io::Write as _;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use starfall_core::{
    BackupMode, Branch, CatalogError, LaunchCommandBuilder, LaunchError, LaunchSettings,
    RuntimeError, RuntimeKind, RuntimeProvisioner, RuntimeSpec, UpdateError, UpdateEvent,
    UpdateOrchestrator, VersionCatalog, VersionEntry, game_jar_exists, read_version_marker,
    updater_user_agent,
};
use starfall_platform::OsFamily;

use crate::cli::Options;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("no {0} versions available and no playable install found")]
    NoVersions(Branch),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("update failed: {0}")]
    UpdateFailed(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Update the selected branch if needed, then start the game; the launcher
/// returns as soon as the game process is up.
pub async fn run(options: Options) -> Result<(), AppError> {
    let mut settings = LaunchSettings::load();
    let branch = options.branch.unwrap_or_else(|| settings.last_used_branch());
    let backup_mode = options.backup_mode.unwrap_or_default();
    info!("Selected branch: {branch}");

    let client = build_http_client().map_err(AppError::ClientBuild)?;

    let mut catalog = VersionCatalog::with_client(client.clone());
    if let Err(error) = catalog.refresh(branch).await {
        warn!("Version index unavailable, continuing offline: {error}");
    }

    let installed_marker = read_version_marker(&settings.install_dir);
    let latest = catalog.latest(branch).cloned();

    let needs_update = options.repair
        || options.force
        || !game_jar_exists(&settings.install_dir)
        || match (&latest, &installed_marker) {
            (Some(latest), Some(marker)) => {
                *marker != format!("{}#{}", latest.version, latest.build)
            }
            (Some(_), None) => true,
            (None, _) => false,
        };

    let active_version = if needs_update {
        let Some(target) = latest else {
            return Err(AppError::NoVersions(branch));
        };
        run_update(&client, &target, backup_mode, &settings).await?;
        settings.set_last_used_version(&target.version);
        Some(target.version)
    } else {
        info!("Install is up to date");
        installed_marker.map(|m| m.split('#').next().unwrap_or(&m).to_string())
    };

    let os = OsFamily::current();
    let runtime = active_version
        .as_deref()
        .map_or_else(|| RuntimeSpec::for_kind(RuntimeKind::Modern, os), |v| {
            RuntimeSpec::select(v, os)
        });

    RuntimeProvisioner::new(client)
        .ensure(&runtime, &settings.install_dir)
        .await?;

    let command = LaunchCommandBuilder::new(&settings.install_dir, runtime, os)
        .memory_mb(settings.memory)
        .extra_args(&settings.launch_args)
        .server_port(options.server_port)
        .build()?;

    settings.set_last_used_branch(branch);
    if let Err(error) = settings.save() {
        warn!("Could not persist settings: {error}");
    }

    // The game owns the terminal from here; the launcher's job is done
    // once the process is up.
    let child = command.spawn()?;
    info!("Game started (pid {:?})", child.id());
    Ok(())
}

async fn run_update(
    client: &reqwest::Client,
    target: &VersionEntry,
    mode: BackupMode,
    settings: &LaunchSettings,
) -> Result<(), AppError> {
    println!("Updating to {target}");

    let orchestrator = UpdateOrchestrator::new(client.clone());
    let mut handle = orchestrator.start(target, mode, &settings.install_dir)?;

    while let Some(event) = handle.recv().await {
        match event {
            UpdateEvent::Progress(progress) => {
                print!(
                    "\r{:<12} {:>3.0}%  {:<12}",
                    progress.status.to_string(),
                    f64::from(progress.fraction.clamp(0.0, 1.0)) * 100.0,
                    format_speed(progress.speed_bps),
                );
                let _ = std::io::stdout().flush();
            }
            UpdateEvent::Finished => {
                println!("\rUpdate to {target} complete.{:<20}", "");
                return Ok(());
            }
            UpdateEvent::Failed(message) => {
                println!();
                return Err(AppError::UpdateFailed(message));
            }
        }
    }

    Err(AppError::UpdateFailed(
        "update ended without a result".to_string(),
    ))
}

/// Shared client for index, update, and runtime downloads. The read timeout
/// bounds silence between chunks, not whole transfers, so it is safe for
/// large streamed downloads.
fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(CONNECT_TIMEOUT)
        .user_agent(updater_user_agent())
        .build()
}

fn format_speed(bps: u64) -> String {
    if bps == 0 {
        return String::new();
    }
    let mbps = bps as f64 / 1_048_576.0;
    if mbps >= 1.0 {
        format!("{mbps:.1} MiB/s")
    } else {
        format!("{:.0} KiB/s", bps as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{build_http_client, format_speed};

    #[test]
    fn speed_formatting_picks_sensible_units() {
        assert_eq!(format_speed(0), "");
        assert_eq!(format_speed(512 * 1024), "512 KiB/s");
        assert_eq!(format_speed(3 * 1_048_576 / 2), "1.5 MiB/s");
    }

    #[tokio::test]
    async fn shared_client_times_out_a_silent_server() {
        use std::io::Read as _;

        // Accepts the connection but never answers; only a read timeout on
        // the client makes this request fail.
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an addr");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0_u8; 1024];
                let _ = stream.read(&mut buf);
                std::thread::sleep(std::time::Duration::from_secs(30));
            }
        });

        let client = build_http_client().expect("client should build");
        let started = std::time::Instant::now();
        let result = client.get(format!("http://{addr}/index")).send().await;

        assert!(result.is_err(), "a silent server must not hang the client");
        assert!(
            started.elapsed() < std::time::Duration::from_secs(25),
            "failure must come from the read timeout, not a hung connection"
        );
    }
}
