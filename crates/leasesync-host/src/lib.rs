// # Host Command Probes
//
// This crate implements the core traits that need the host system:
//
// - [`NdpProbe`]: `NeighborProbe` over `ndp -an` (BSD) or `ip -6 neigh show` (Linux)
// - [`GetentResolver`]: `HostnameResolver` over `getent hosts <ip>`
//
// Both shell out with `tokio::process` and parse stdout. Each call is one
// command invocation with a timeout; scheduling belongs to the caller.

mod getent;
mod ndp;

pub use getent::{GetentResolver, short_hostname};
pub use ndp::{NdpProbe, parse_ip_neigh_output, parse_ndp_output};

use leasesync_core::Error;
use std::time::Duration;
use tokio::process::Command;

/// Default time a host command may run before it is abandoned
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Output of a finished command
struct CommandOutput {
    status: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Run `program` with `args`, capturing output
///
/// Errors cover spawn failures and timeouts; a non-zero exit is reported
/// through `status` for the caller to interpret.
async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
    map_err: fn(String) -> Error,
) -> Result<CommandOutput, Error> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| map_err(format!("'{program}' timed out after {timeout:?}")))?
        .map_err(|e| map_err(format!("Failed to run '{program}': {e}")))?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
