//! Thin systemd service control for `--service`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

const SERVICE_NAME: &str = "shunt";
const UNIT_PATH: &str = "/etc/systemd/system/shunt.service";

/// Dispatches a `--service` action.
pub fn control(action: &str, config: &Path) -> Result<()> {
    match action {
        "install" => install(config),
        "uninstall" => uninstall(),
        "start" | "stop" | "restart" => systemctl(&[action, SERVICE_NAME]),
        other => bail!(
            "unknown service action {:?} (install, start, stop, restart, uninstall)",
            other
        ),
    }
}

fn install(config: &Path) -> Result<()> {
    let exe = std::env::current_exe().context("resolving executable path")?;
    let config = config
        .canonicalize()
        .with_context(|| format!("resolving config path {}", config.display()))?;

    let unit = format!(
        "[Unit]\n\
         Description=shunt DNS forwarder\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={} --config={}\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        exe.display(),
        config.display()
    );

    std::fs::write(UNIT_PATH, unit)
        .with_context(|| format!("writing {}", UNIT_PATH))?;
    systemctl(&["daemon-reload"])?;
    systemctl(&["enable", SERVICE_NAME])?;
    println!("installed {}", UNIT_PATH);
    Ok(())
}

fn uninstall() -> Result<()> {
    systemctl(&["disable", SERVICE_NAME])?;
    std::fs::remove_file(UNIT_PATH)
        .with_context(|| format!("removing {}", UNIT_PATH))?;
    systemctl(&["daemon-reload"])?;
    println!("removed {}", UNIT_PATH);
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<()> {
    let status = Command::new("systemctl")
        .args(args)
        .status()
        .context("running systemctl")?;
    if !status.success() {
        bail!("systemctl {:?} exited with {}", args, status);
    }
    Ok(())
}
