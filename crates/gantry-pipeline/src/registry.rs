//! Container image build and registry publish commands.
//!
//! Thin wrappers over the container tool; exit statuses propagate verbatim
//! as [`gantry_core::PipelineError::ExternalCommand`]. The local image
//! garbage collection after a push is best-effort by design.

use std::path::Path;

use gantry_core::{Result, ScopedCredentials};
use tracing::debug;

use crate::exec::ExternalCommand;

/// Build the local image from a build context directory.
pub async fn build_image(
    local_image: &str,
    context_path: &Path,
    no_cache: bool,
    credentials: &ScopedCredentials,
) -> Result<()> {
    let mut command = ExternalCommand::new("build_image", "docker")
        .args(["build", "-t", local_image])
        .credentials(credentials);
    if no_cache {
        command = command.arg("--no-cache");
    }
    command
        .arg(context_path.to_string_lossy().to_string())
        .run_checked()
        .await?;
    Ok(())
}

/// Authenticate to the registry endpoint with the scope's registry
/// credentials. The password travels over the child's stdin only; it never
/// appears in an argument list or in Gantry's own environment.
pub async fn registry_login(registry_host: &str, credentials: &ScopedCredentials) -> Result<()> {
    let username = credentials.get("REGISTRY_USERNAME").unwrap_or("AWS");
    let password = credentials.get("REGISTRY_PASSWORD").unwrap_or_default();
    ExternalCommand::new("registry_login", "docker")
        .args(["login", "--username", username, "--password-stdin"])
        .arg(format!("https://{registry_host}"))
        .stdin_data(password.as_bytes().to_vec())
        .run_checked()
        .await?;
    Ok(())
}

/// Tag the local image with its remote reference and push it, then attempt
/// a best-effort local garbage collection of both references.
pub async fn publish_image(
    local_image: &str,
    remote_image: &str,
    credentials: &ScopedCredentials,
) -> Result<()> {
    ExternalCommand::new("publish", "docker")
        .args(["tag", local_image, remote_image])
        .credentials(credentials)
        .run_checked()
        .await?;

    ExternalCommand::new("publish", "docker")
        .args(["push", remote_image])
        .credentials(credentials)
        .run_checked()
        .await?;

    // Best-effort: a failed rmi leaves a stale local image, nothing more.
    let gc = ExternalCommand::new("publish", "docker")
        .args(["rmi", local_image, remote_image])
        .run()
        .await;
    if let Ok(output) = gc {
        if !output.success() {
            debug!(
                event = "publish.gc_skipped",
                exit_code = output.exit_code,
                "local image garbage collection failed"
            );
        }
    }

    Ok(())
}
