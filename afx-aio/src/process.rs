// afx-aio/src/process.rs
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Output, Stdio};

use afx_common::error::{AfxError, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs one build step inside `cwd`.
///
/// Outside single quotes, backtick substitutions are evaluated with `sh -c`
/// and `$VAR` references are expanded against `env` merged over the process
/// environment. Single-quoted text is kept verbatim. The result is split into
/// words. A leading `sudo` becomes `sudo -S` and is fed
/// `sudo_password` on stdin. A non-zero exit yields `AfxError::Build` carrying
/// the captured stderr.
pub async fn run_build_step(
    step: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    sudo_password: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Output> {
    let mut expanded = String::with_capacity(step.len());
    for (expand, text) in quoted_segments(step) {
        if !expand {
            expanded.push_str(text);
            continue;
        }
        let substituted = substitute_backticks(text, cwd, env, cancel).await?;
        expanded.push_str(&shellexpand::env_with_context_no_errors(&substituted, |var| {
            env.get(var)
                .cloned()
                .or_else(|| std::env::var(var).ok())
        }));
    }
    let mut argv = shell_words::split(&expanded)
        .map_err(|e| AfxError::Build(format!("failed to parse '{step}': {e}")))?;
    if argv.is_empty() {
        return Err(AfxError::Build(format!("empty build step '{step}'")));
    }

    let mut stdin = None;
    if argv[0] == "sudo" {
        if !argv.iter().skip(1).any(|a| a == "-S") {
            argv.insert(1, "-S".to_string());
        }
        stdin = Some(format!("{}\n", sudo_password.unwrap_or_default()));
    }

    let program = argv.remove(0);
    debug!("Running build step in {}: {} {:?}", cwd.display(), program, argv);
    let output = run(&program, &argv, cwd, env, stdin.as_deref(), cancel).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("Build step '{}' failed with {}", step, output.status);
        let message = if stderr.is_empty() {
            format!("'{step}' exited with {}", output.status)
        } else {
            stderr
        };
        return Err(AfxError::Build(message));
    }
    Ok(output)
}

/// Spawns a child and waits for it, killing it if `cancel` fires first.
pub async fn run(
    program: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    stdin: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .envs(env)
        .kill_on_drop(true)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to execute {}: {}", program, e);
        AfxError::Build(format!("failed to run {program}: {e}"))
    })?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        drop(pipe);
    }

    tokio::select! {
        output = child.wait_with_output() => Ok(output?),
        _ = cancel.cancelled() => {
            debug!("Cancelled while running {}", program);
            Err(AfxError::Cancelled)
        }
    }
}

/// Splits `step` into runs to expand (`true`) and single-quoted runs, quotes
/// included, to keep verbatim (`false`). A quote inside double quotes, after a
/// backslash or inside backticks does not start a verbatim run.
fn quoted_segments(step: &str) -> Vec<(bool, &str)> {
    let bytes = step.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut in_double = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'`' => {
                if let Some(len) = step[i + 1..].find('`') {
                    i += len + 1;
                }
            }
            b'"' => in_double = !in_double,
            b'\'' if !in_double => {
                if start < i {
                    segments.push((true, &step[start..i]));
                }
                let end = step[i + 1..]
                    .find('\'')
                    .map_or(bytes.len(), |len| i + len + 2);
                segments.push((false, &step[i..end]));
                start = end;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if start < bytes.len() {
        segments.push((true, &step[start..]));
    }
    segments
}

async fn substitute_backticks(
    step: &str,
    cwd: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut out = String::with_capacity(step.len());
    let mut rest = step;
    while let Some(start) = rest.find('`') {
        let Some(len) = rest[start + 1..].find('`') else {
            return Err(AfxError::Build(format!("unterminated backtick in '{step}'")));
        };
        out.push_str(&rest[..start]);
        let inner = &rest[start + 1..start + 1 + len];
        let output = run(
            "sh",
            &["-c".to_string(), inner.to_string()],
            cwd,
            env,
            None,
            cancel,
        )
        .await?;
        if !output.status.success() {
            return Err(AfxError::Build(format!(
                "command substitution '{inner}' failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        out.push_str(String::from_utf8_lossy(&output.stdout).trim_end_matches('\n'));
        rest = &rest[start + 1 + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
