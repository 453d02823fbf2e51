// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform browser launch for the interactive flow.

use gg_error::{Error, ErrorCode, Result};

/// The launch command and arguments for `os` (a `std::env::consts::OS`
/// value; `darwin` is accepted as an alias for `macos`).
pub fn browser_command(os: &str, url: &str) -> Result<(String, Vec<String>)> {
    if url.trim().is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            "browser URL must not be empty",
        ));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::new(
            ErrorCode::InvalidArgument,
            format!("browser URL '{url}' must be http or https"),
        ));
    }
    match os {
        "macos" | "darwin" => Ok(("open".to_string(), vec![url.to_string()])),
        "linux" => Ok(("xdg-open".to_string(), vec![url.to_string()])),
        "windows" => Ok((
            "cmd".to_string(),
            vec![
                "/C".to_string(),
                "start".to_string(),
                String::new(),
                url.to_string(),
            ],
        )),
        other => Err(Error::new(
            ErrorCode::BrowserUnsupportedOs,
            format!("no browser launch command known for OS '{other}'"),
        )),
    }
}

/// Launch the system browser at `url`.
pub fn open_browser(url: &str) -> Result<()> {
    let (command, args) = browser_command(std::env::consts::OS, url)?;
    tracing::debug!(%command, %url, "launching browser");
    std::process::Command::new(&command)
        .args(&args)
        .spawn()
        .map_err(|e| {
            Error::new(
                ErrorCode::Io,
                format!("failed to launch browser via '{command}'"),
            )
            .with_source(e)
        })?;
    Ok(())
}
