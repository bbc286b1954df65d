// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::error::ProcessError;
use crate::handle::Handle;

/// What to feed the child on stdin. `Null` matches spec.md's default (the
/// supervisor never feeds its child stdin); `Bytes` covers the daemon's
/// `service` re-exec, which pipes `SupervisorOpts` JSON to the supervisor's
/// stdin.
pub enum Stdin {
    Null,
    Bytes(Vec<u8>),
}

/// Where the child's stdout goes. `Inherit` matches the supervisor case,
/// where the child process shares the supervisor's own stdout (already
/// redirected to a log file by the daemon that spawned the supervisor).
/// `Writer` is the workflow executor's case: stdout is copied into a
/// caller-owned sink (the step's `log` artifact file) as it's produced, and
/// the sink is closed when the child exits.
pub enum Stdout<W> {
    Inherit,
    Writer(W),
}

/// Spawns `script` as a new process group rooted at `workdir`.
///
/// Dispatch rule: a script containing a newline is written to a temporary
/// `0700` executable file under `workdir` and run as `bash -c <file>`;
/// otherwise it is whitespace-split and `argv[0]` is executed directly with
/// the remaining fields as arguments. `env` entries are appended to the
/// parent's environment, later entries winning on duplicate keys.
pub async fn spawn<W>(
    workdir: &Path,
    script: &str,
    env: &[(String, String)],
    stdin: Stdin,
    stdout: Stdout<W>,
) -> Result<Handle, ProcessError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    if script.trim().is_empty() {
        return Err(ProcessError::Spawn("empty script".into()));
    }

    let (mut command, temp_script) = if script.contains('\n') {
        let path = write_temp_script(workdir, script).await?;
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&path);
        (cmd, Some(path))
    } else {
        let mut fields = script.split_whitespace();
        let argv0 = fields.next().ok_or_else(|| ProcessError::Spawn("empty script".into()))?;
        let mut cmd = Command::new(argv0);
        cmd.args(fields);
        (cmd, None)
    };

    command.current_dir(workdir);
    command.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    #[cfg(unix)]
    command.process_group(0);

    command.stderr(Stdio::piped());
    match stdin {
        Stdin::Null => {
            command.stdin(Stdio::null());
        }
        Stdin::Bytes(_) => {
            command.stdin(Stdio::piped());
        }
    }
    let stdout_piped = matches!(stdout, Stdout::Writer(_));
    if stdout_piped {
        command.stdout(Stdio::piped());
    } else {
        command.stdout(Stdio::inherit());
    }

    let mut child = command
        .spawn()
        .map_err(|err| ProcessError::Spawn(err.to_string()))?;
    let pid = child.id();

    let stdin_task = match (stdin, child.stdin.take()) {
        (Stdin::Bytes(bytes), Some(mut child_stdin)) => Some(tokio::spawn(async move {
            let _ = child_stdin.write_all(&bytes).await;
            let _ = child_stdin.shutdown().await;
        })),
        _ => None,
    };

    let stdout_task = match (stdout, child.stdout.take()) {
        (Stdout::Writer(mut writer), Some(mut child_stdout)) => Some(tokio::spawn(async move {
            let _ = tokio::io::copy(&mut child_stdout, &mut writer).await;
            let _ = writer.shutdown().await;
        })),
        _ => None,
    };

    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf_task = stderr_buf.clone();
    let stderr_task = child.stderr.take().map(|mut child_stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = child_stderr.read_to_end(&mut buf).await;
            *stderr_buf_task.lock() = buf;
        })
    });

    Ok(Handle::new(
        child,
        pid,
        stderr_buf,
        stderr_task,
        stdout_task,
        stdin_task,
        temp_script,
    ))
}

async fn write_temp_script(workdir: &Path, script: &str) -> Result<PathBuf, ProcessError> {
    let name = format!(".zallet-script-{}", nanoid::nanoid!(12));
    let path = workdir.join(name);
    tokio::fs::write(&path, script).await?;
    set_executable(&path).await?;
    Ok(path)
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), ProcessError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o700);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), ProcessError> {
    Ok(())
}
