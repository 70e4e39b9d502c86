use anyhow::{anyhow, Result};
use log::debug;
use std::process::{Command, Stdio};

fn opener_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        // Empty title so `start` does not eat the URL
        cmd.args(["/C", "start", "", url]);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    }
}

/// Hand a URL to the desktop's default handler.
pub fn open_url(url: &str) -> Result<()> {
    if !is_openable(url) {
        return Err(anyhow!("Refusing to open non-http URL: {url}"));
    }

    debug!("Opening {url}");
    // Output would scribble over the TUI
    opener_command(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("Failed to launch browser: {e}"))?;

    Ok(())
}

pub fn is_openable(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_openable() {
        assert!(is_openable("https://open.spotify.com/track/abc"));
        assert!(is_openable("http://127.0.0.1:8888/callback"));
        assert!(!is_openable("file:///etc/passwd"));
        assert!(!is_openable("spotify:track:abc"));
        assert!(!is_openable(""));
    }

    #[test]
    fn test_open_url_rejects_non_http() {
        assert!(open_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_opener_command_carries_url() {
        let cmd = opener_command("https://example.com");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.last().map(String::as_str), Some("https://example.com"));
    }
}
