//! One-shot topology discovery: `list-sessions`, `list-windows`,
//! `list-panes`, run as child processes regardless of streaming/polling
//! mode (§4.F's shim covers capture/send-keys; discovery always goes
//! through one-shot commands since it happens on its own timer, not inside
//! a session's control-mode connection).

use tokio::process::Command;

use crate::error::{ObserverError, Result};

/// Topology of one observed pane, as reported by `list-panes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneTopology {
    pub pane_id: String,
    pub session_name: String,
    pub window_name: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub title: String,
    pub active: bool,
}

fn mux_args(socket: Option<&str>) -> Vec<String> {
    match socket {
        Some(s) => vec!["-S".to_string(), s.to_string()],
        None => Vec::new(),
    }
}

async fn run_tmux(socket: Option<&str>, args: &[&str]) -> Result<String> {
    let mut full_args = mux_args(socket);
    full_args.extend(args.iter().map(|s| s.to_string()));

    let output = Command::new("tmux")
        .args(&full_args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ObserverError::MuxAbsent
            } else {
                ObserverError::ProtocolSpawnFailed(e.to_string())
            }
        })?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    if stderr.contains("no server running") || stderr.contains("no sessions") {
        return Ok(String::new());
    }
    Err(ObserverError::CommandFailed {
        message: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// `list-sessions -F "#{session_name}"`.
pub async fn list_sessions(socket: Option<&str>) -> Result<Vec<String>> {
    let out = run_tmux(socket, &["list-sessions", "-F", "#{session_name}"]).await?;
    Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

/// `list-windows -t <session> -F "#{window_index}|#{window_name}"`.
pub async fn list_windows(socket: Option<&str>, session: &str) -> Result<Vec<(u32, String)>> {
    let target = session.to_string();
    let out = run_tmux(
        socket,
        &[
            "list-windows",
            "-t",
            &target,
            "-F",
            "#{window_index}|#{window_name}",
        ],
    )
    .await?;

    let mut windows = Vec::new();
    for line in out.lines() {
        let mut parts = line.splitn(2, '|');
        let (Some(index), Some(name)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let Ok(index) = index.parse() {
            windows.push((index, name.to_string()));
        }
    }
    Ok(windows)
}

/// `list-panes -t <session>:<window> -F "#{pane_id}|#{session_name}|#{window_name}|#{window_index}|#{pane_index}|#{pane_title}|#{pane_active}"`.
pub async fn list_panes(
    socket: Option<&str>,
    session: &str,
    window_index: u32,
) -> Result<Vec<PaneTopology>> {
    let target = format!("{}:{}", session, window_index);
    let out = run_tmux(
        socket,
        &[
            "list-panes",
            "-t",
            &target,
            "-F",
            "#{pane_id}|#{session_name}|#{window_name}|#{window_index}|#{pane_index}|#{pane_title}|#{pane_active}",
        ],
    )
    .await?;

    let mut panes = Vec::new();
    for line in out.lines() {
        let fields: Vec<&str> = line.splitn(7, '|').collect();
        if fields.len() != 7 {
            continue;
        }
        let (Ok(window_index), Ok(pane_index)) = (fields[3].parse(), fields[4].parse()) else {
            continue;
        };
        panes.push(PaneTopology {
            pane_id: fields[0].to_string(),
            session_name: fields[1].to_string(),
            window_name: fields[2].to_string(),
            window_index,
            pane_index,
            title: fields[5].to_string(),
            active: fields[6] == "1",
        });
    }
    Ok(panes)
}

/// Enumerate every pane across every session and window, the full topology
/// diffed against the registry on each discovery tick.
pub async fn discover_all_panes(socket: Option<&str>) -> Result<Vec<PaneTopology>> {
    let mut all = Vec::new();
    for session in list_sessions(socket).await? {
        let windows = match list_windows(socket, &session).await {
            Ok(w) => w,
            Err(_) => continue,
        };
        for (window_index, _name) in windows {
            if let Ok(panes) = list_panes(socket, &session, window_index).await {
                all.extend(panes);
            }
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_args_empty_without_socket() {
        assert!(mux_args(None).is_empty());
    }

    #[test]
    fn mux_args_prepends_socket_flag() {
        assert_eq!(mux_args(Some("/tmp/s")), vec!["-S", "/tmp/s"]);
    }
}
