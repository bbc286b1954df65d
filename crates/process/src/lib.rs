// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! zallet-process: spawns a command as a new process group, streams stderr
//! into an in-memory buffer, and exposes pid/wait/kill — spec.md §4.A.

mod error;
mod handle;
mod spawn;

pub use error::ProcessError;
pub use handle::Handle;
pub use spawn::{spawn, Stdin, Stdout};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_single_line_command_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(dir.path(), "true", &[], Stdin::Null, Stdout::<tokio::io::Sink>::Inherit)
            .await
            .unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_exit_without_stderr_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(dir.path(), "false", &[], Stdin::Null, Stdout::<tokio::io::Sink>::Inherit)
            .await
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, ProcessError::Exited(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_with_stderr_replaces_error_with_stderr_text() {
        let dir = tempfile::tempdir().unwrap();
        let script = "echo boom 1>&2\nexit 1\n";
        let handle = spawn(dir.path(), script, &[], Stdin::Null, Stdout::<tokio::io::Sink>::Inherit)
            .await
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.to_string().trim(), "boom");
    }

    #[tokio::test]
    async fn wait_is_idempotent_and_returns_closed_sentinel_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(dir.path(), "true", &[], Stdin::Null, Stdout::<tokio::io::Sink>::Inherit)
            .await
            .unwrap();
        handle.wait().await.unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, ProcessError::Closed));
    }

    #[tokio::test]
    async fn env_entries_are_visible_to_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let out_file = tokio::fs::File::create(&out_path).await.unwrap();
        let handle = spawn(
            dir.path(),
            "sh -c 'echo $ZALLET_TEST_VAR'",
            &[("ZALLET_TEST_VAR".to_string(), "hello".to_string())],
            Stdin::Null,
            Stdout::Writer(out_file),
        )
        .await
        .unwrap();
        handle.wait().await.unwrap();
        let contents = tokio::fs::read_to_string(&out_path).await.unwrap();
        assert_eq!(contents.trim(), "hello");
    }

    #[tokio::test]
    async fn multiline_script_runs_via_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(
            dir.path(),
            "x=1\necho $x\n",
            &[],
            Stdin::Null,
            Stdout::<tokio::io::Sink>::Inherit,
        )
        .await
        .unwrap();
        handle.wait().await.unwrap();
        let mut entries = std::fs::read_dir(dir.path()).unwrap();
        assert!(entries.next().is_none(), "temp script should be cleaned up");
    }

    #[tokio::test]
    async fn kill_terminates_the_process_group_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(
            dir.path(),
            "sleep 30",
            &[],
            Stdin::Null,
            Stdout::<tokio::io::Sink>::Inherit,
        )
        .await
        .unwrap();
        let pid = handle.pid().unwrap();
        handle.kill().await.unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, ProcessError::Exited(_)));
        assert!(!nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok());
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let err = spawn(
            dir.path(),
            "/no/such/binary-zallet-test",
            &[],
            Stdin::Null,
            Stdout::<tokio::io::Sink>::Inherit,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_)));
    }

    #[tokio::test]
    async fn stdin_bytes_are_delivered_to_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn(
            dir.path(),
            "cat",
            &[],
            Stdin::Bytes(b"hi from test\n".to_vec()),
            Stdout::<tokio::io::Sink>::Inherit,
        )
        .await
        .unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timing_sanity_check_for_kill_grace_period() {
        // Documents the 30s grace window without actually sleeping it.
        assert_eq!(Duration::from_secs(30).as_secs(), 30);
    }
}
