#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSample {
    pub app_name: String,
    pub window_title: Option<String>,
    pub bundle_id: Option<String>,
    pub url: Option<String>,
}

pub trait WindowSampler: Send {
    fn sample(&mut self) -> Option<WindowSample>;
}

pub struct SystemSampler;

impl WindowSampler for SystemSampler {
    fn sample(&mut self) -> Option<WindowSample> {
        collect_foreground_window()
    }
}

// A locked screen or denied Accessibility permission yields None, which the
// monitor treats as a skipped tick.
pub fn collect_foreground_window() -> Option<WindowSample> {
    #[cfg(target_os = "macos")]
    {
        let app_name = run_osascript(
            "tell application \"System Events\" to get name of first application process whose frontmost is true",
        )
        .ok()
        .filter(|value| !value.is_empty())?;

        let window_title = run_osascript(
            "tell application \"System Events\" to tell (first application process whose frontmost is true) to get name of front window",
        )
        .ok()
        .filter(|value| !value.is_empty());

        let bundle_id = run_osascript(
            "tell application \"System Events\" to get bundle identifier of first application process whose frontmost is true",
        )
        .ok()
        .filter(|value| !value.is_empty());

        let url = frontmost_browser_url(&app_name);

        return Some(WindowSample {
            app_name,
            window_title,
            bundle_id,
            url,
        });
    }

    #[cfg(not(target_os = "macos"))]
    {
        None
    }
}

pub fn window_access_available() -> bool {
    collect_foreground_window()
        .map(|sample| sample.window_title.is_some())
        .unwrap_or(false)
}

#[cfg(target_os = "macos")]
fn frontmost_browser_url(app_name: &str) -> Option<String> {
    let script = match app_name {
        "Safari" => "tell application \"Safari\" to get URL of current tab of front window".to_string(),
        "Google Chrome" | "Brave Browser" | "Microsoft Edge" | "Arc" => format!(
            "tell application \"{app_name}\" to get URL of active tab of front window"
        ),
        _ => return None,
    };

    run_osascript(&script).ok().filter(|value| !value.is_empty())
}

#[cfg(target_os = "macos")]
fn run_osascript(script: &str) -> std::io::Result<String> {
    let output = std::process::Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(std::io::Error::other(stderr))
    }
}
