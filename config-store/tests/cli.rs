use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use config_store::{persistence::PersistenceManager, store::Snapshot};
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_store_load_erase_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("config-store");
    let dir = TempDir::new()?;
    let storage = dir.path().join("store.bin");

    let (mut server, mut server_stdout) =
        spawn_server(&binary, &storage, "127.0.0.1:0", &[]).await?;
    let addr = read_listen_addr(&mut server_stdout).await?;

    // Drain additional server logs in the background so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let stored = run_client(&binary, &["store", "prefix", "10.0.0.0/8"], &addr).await?;
    assert!(stored.success, "store should succeed");

    let loaded = run_client(&binary, &["load", "prefix"], &addr).await?;
    assert!(loaded.success);
    assert_eq!(loaded.stdout.trim_end(), "10.0.0.0/8");

    let erased = run_client(&binary, &["erase", "prefix"], &addr).await?;
    assert!(erased.success);

    let missing = run_client(&binary, &["load", "prefix"], &addr).await?;
    assert!(!missing.success, "load of erased key should fail");
    assert_eq!(missing.stdout.trim_end(), "*** request for 'prefix' failed");

    // Synchronous mode is the default, so every mutation is already on disk.
    assert!(storage.exists());

    let _ = server.kill().await;
    let _ = server.wait().await;
    let _ = server_log_task.await;

    Ok(())
}

#[tokio::test]
async fn serve_exits_with_failure_when_bind_fails() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("config-store");
    let dir = TempDir::new()?;
    let storage = dir.path().join("store.bin");

    let taken = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = taken.local_addr()?.to_string();

    let (mut server, _stdout) = spawn_server(&binary, &storage, &addr, &[]).await?;
    let status = timeout(READ_TIMEOUT, server.wait())
        .await
        .context("serve should exit on its own")??;

    assert!(!status.success());
    assert!(!storage.exists(), "nothing should be written without a socket");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_saves_pending_mutations_before_exit() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("config-store");
    let dir = TempDir::new()?;
    let storage = dir.path().join("store.bin");

    // The debounce timer can't fire during the test, so only the final save
    // can put the value on disk.
    let (mut server, mut server_stdout) = spawn_server(
        &binary,
        &storage,
        "127.0.0.1:0",
        &[
            "--save-initial-backoff-ms",
            "60000",
            "--save-max-backoff-ms",
            "600000",
        ],
    )
    .await?;
    let addr = read_listen_addr(&mut server_stdout).await?;
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let stored = run_client(&binary, &["store", "drain", "true"], &addr).await?;
    assert!(stored.success);
    assert!(!storage.exists(), "debounced save should still be pending");

    let pid = server.id().context("server exited early")?;
    let killed = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await?;
    assert!(killed.success());

    let status = timeout(READ_TIMEOUT, server.wait())
        .await
        .context("serve should exit after SIGTERM")??;
    assert!(status.success(), "serve exited with {status}");
    let _ = server_log_task.await;

    let snapshot = PersistenceManager::new(&storage).load()?;
    assert_eq!(snapshot, Snapshot::from_iter([("drain", "true")]));
    Ok(())
}

struct ClientOutput {
    success: bool,
    stdout: String,
}

async fn spawn_server(
    binary: &Path,
    storage: &Path,
    listen: &str,
    extra_args: &[&str],
) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("serve")
        .arg("--storage-path")
        .arg(storage)
        .arg("--listen")
        .arg(listen)
        .args(extra_args)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_listen_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    loop {
        let line = read_line(reader)
            .await?
            .context("server exited before it started listening")?;
        if !line.contains("listening on") {
            continue;
        }

        let addr = line
            .split_whitespace()
            .last()
            .context("unexpected listening banner format")?;
        if !addr.contains(':') {
            return Err(anyhow!("listening banner missing socket: {line}"));
        }
        return Ok(addr.to_string());
    }
}

async fn run_client(binary: &Path, args: &[&str], addr: &str) -> Result<ClientOutput> {
    let output = timeout(
        READ_TIMEOUT,
        Command::new(binary)
            .args(args)
            .arg("--server")
            .arg(addr)
            .env("NO_COLOR", "1")
            .env("RUST_LOG", "warn")
            .stderr(Stdio::null())
            .output(),
    )
    .await
    .with_context(|| format!("client {args:?} timed out"))?
    .with_context(|| format!("failed to run client {args:?}"))?;

    Ok(ClientOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}
