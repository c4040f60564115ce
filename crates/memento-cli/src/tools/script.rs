//! Script execution with a wall-clock limit

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{debug, warn};

use super::ExecutionResult;

const PYTHON: &str = if cfg!(windows) { "python" } else { "python3" };

/// Extension → interpreter and leading arguments
const INTERPRETERS: &[(&str, &str, &[&str])] = &[
    ("py", PYTHON, &[]),
    ("sh", "sh", &[]),
    ("bash", "bash", &[]),
    ("js", "node", &[]),
    ("mjs", "node", &[]),
    ("rb", "ruby", &[]),
    ("pl", "perl", &[]),
    (
        "ps1",
        "powershell",
        &["-NoProfile", "-ExecutionPolicy", "Bypass", "-File"],
    ),
    ("bat", "cmd", &["/C"]),
    ("cmd", "cmd", &["/C"]),
];

/// Grace period for output readers after the process is gone
const READER_GRACE: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8192;

/// Bytes read so far from one output stream
type Captured = Arc<Mutex<Vec<u8>>>;

/// Interpreter for a script, or `None` to execute the file directly
pub fn interpreter_for(script: &Path) -> Option<(&'static str, &'static [&'static str])> {
    let ext = script.extension()?.to_str()?.to_ascii_lowercase();
    INTERPRETERS
        .iter()
        .find(|(e, _, _)| *e == ext)
        .map(|(_, program, args)| (*program, *args))
}

fn build_command(script: &Path) -> Command {
    match interpreter_for(script) {
        Some((program, args)) => {
            let mut cmd = Command::new(program);
            cmd.args(args).arg(script);
            cmd
        }
        None => Command::new(script),
    }
}

/// Run a script to completion or until `limit` elapses
pub async fn run(
    script: &Path,
    working_dir: &Path,
    limit: Duration,
    max_output_len: usize,
) -> ExecutionResult {
    let mut cmd = build_command(script);
    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a timeout can take down anything the script spawned
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(script = %script.display(), error = %e, "Failed to launch script");
            return ExecutionResult::failed(format!(
                "failed to launch {}: {}",
                script.display(),
                e
            ));
        }
    };

    let pid = child.id();
    debug!(script = %script.display(), pid, "Script started");

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let waited = timeout(limit, child.wait()).await;

    let timed_out = waited.is_err();
    if timed_out {
        kill_process_group(pid);
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Script already gone at kill");
        }
    }

    // A background child may keep the pipes open after the script exits
    let deadline = Instant::now() + READER_GRACE;
    let stdout = collect(stdout, deadline).await;
    let stderr = collect(stderr, deadline).await;
    let output = combine_output(&stdout, &stderr, max_output_len);

    match waited {
        Ok(Ok(status)) => ExecutionResult::completed(status.code(), output),
        Ok(Err(e)) => ExecutionResult::failed(format!(
            "failed while waiting for {}: {}\n{}",
            script.display(),
            e,
            output
        )),
        Err(_) => {
            let notice = format!("[timed out after {} seconds]", limit.as_secs_f64());
            if output.is_empty() {
                ExecutionResult::timed_out(notice)
            } else {
                ExecutionResult::timed_out(format!("{}\n{}", output, notice))
            }
        }
    }
}

fn spawn_reader<R>(reader: Option<R>) -> (Captured, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Captured::default();
    let sink = Arc::clone(&captured);
    let task = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "Stopped reading script output");
                    break;
                }
            }
        }
    });
    (captured, task)
}

/// Wait for a reader until `deadline`, then keep whatever it has read
async fn collect((captured, mut task): (Captured, JoinHandle<()>), deadline: Instant) -> Vec<u8> {
    if timeout_at(deadline, &mut task).await.is_err() {
        debug!("Output pipe still open after exit, keeping partial output");
        task.abort();
    }
    std::mem::take(&mut *lock(&captured))
}

fn lock(captured: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // Negative pid addresses the whole group
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// stdout, then stderr under a separator, truncated on a char boundary
pub fn combine_output(stdout: &[u8], stderr: &[u8], max_len: usize) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut combined = String::new();
    if !stdout.is_empty() {
        combined.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push_str("\n--- stderr ---\n");
        }
        combined.push_str(&stderr);
    }

    if combined.len() <= max_len {
        return combined;
    }

    let mut end = max_len;
    while !combined.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n[Output truncated at {} bytes]",
        &combined[..end],
        max_len
    )
}
