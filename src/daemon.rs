use crate::config::Config;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub installed: bool,
    pub loaded: bool,
    pub details: String,
}

pub fn plist_path(config: &Config) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to resolve HOME directory")?;
    Ok(home
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{}.plist", config.daemon_label)))
}

pub fn install(config: &Config) -> Result<PathBuf> {
    let plist = plist_path(config)?;
    let parent = plist
        .parent()
        .context("launchd plist path has no parent directory")?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create LaunchAgents directory: {}", parent.display()))?;

    let binary = std::env::current_exe().context("Failed to resolve current executable path")?;
    let log_dir = Config::root_dir()?.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let rendered = render_agent_plist(
        &config.daemon_label,
        &binary.display().to_string(),
        &log_dir.display().to_string(),
    );
    fs::write(&plist, rendered)
        .with_context(|| format!("Failed to write launchd plist: {}", plist.display()))?;

    Ok(plist)
}

#[cfg(target_os = "macos")]
pub fn load(config: &Config) -> Result<()> {
    let plist = plist_path(config)?;
    if !plist.exists() {
        bail!("launchd plist not found: {}", plist.display());
    }

    // Re-bootstrapping an already-loaded agent fails, so boot it out first.
    let _ = launchctl::bootout_plist(&plist);
    launchctl::bootstrap(&plist)
}

#[cfg(not(target_os = "macos"))]
pub fn load(_config: &Config) -> Result<()> {
    bail!("background agent install is only supported on macOS");
}

#[cfg(target_os = "macos")]
pub fn unload(config: &Config) -> Result<()> {
    let plist = plist_path(config)?;

    if plist.exists() {
        let _ = launchctl::bootout_plist(&plist);
    } else {
        let _ = launchctl::bootout_label(&config.daemon_label);
    }

    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub fn unload(_config: &Config) -> Result<()> {
    bail!("background agent install is only supported on macOS");
}

pub fn restart(config: &Config) -> Result<()> {
    unload(config)?;
    load(config)
}

pub fn status(config: &Config) -> Result<DaemonStatus> {
    let installed = plist_path(config)?.exists();

    #[cfg(target_os = "macos")]
    {
        Ok(match launchctl::print(&config.daemon_label) {
            Ok(details) => DaemonStatus {
                installed,
                loaded: true,
                details,
            },
            Err(error) => DaemonStatus {
                installed,
                loaded: false,
                details: error.to_string(),
            },
        })
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(DaemonStatus {
            installed,
            loaded: false,
            details: "background agent is only available on macOS".to_string(),
        })
    }
}

fn render_agent_plist(label: &str, binary: &str, log_dir: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{binary}</string>
    <string>service</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>ProcessType</key>
  <string>Background</string>
  <key>StandardOutPath</key>
  <string>{log_dir}/signaltrack.log</string>
  <key>StandardErrorPath</key>
  <string>{log_dir}/signaltrack.err.log</string>
</dict>
</plist>
"#
    )
}

#[cfg(target_os = "macos")]
mod launchctl {
    use anyhow::{Context, Result, bail};
    use std::path::Path;
    use std::process::Command;

    pub fn bootstrap(plist: &Path) -> Result<()> {
        run(&["bootstrap", &gui_domain(), &plist.to_string_lossy()]).map(|_| ())
    }

    pub fn bootout_plist(plist: &Path) -> Result<()> {
        run(&["bootout", &gui_domain(), &plist.to_string_lossy()]).map(|_| ())
    }

    pub fn bootout_label(label: &str) -> Result<()> {
        run(&["bootout", &format!("{}/{label}", gui_domain())]).map(|_| ())
    }

    pub fn print(label: &str) -> Result<String> {
        run(&["print", &format!("{}/{label}", gui_domain())])
    }

    fn gui_domain() -> String {
        format!("gui/{}", unsafe { libc::geteuid() })
    }

    fn run(args: &[&str]) -> Result<String> {
        let output = Command::new("launchctl")
            .args(args)
            .output()
            .context("Failed to execute launchctl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            bail!("launchctl error: {stderr}");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
