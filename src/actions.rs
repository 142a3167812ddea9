//! Remediation dispatch: the privileged helpers run as external
//! processes (this same binary in helper mode), prefixed with a
//! non-interactive sudo when we are not already root. Exit status and
//! captured output are folded into a status-line message; nothing in
//! here is ever fatal to the monitor.

use std::process::Command;

use log::warn;

#[derive(Clone, Copy, Debug)]
pub enum Helper {
    SwapClean,
    DropCaches,
}

impl Helper {
    pub fn name(self) -> &'static str {
        match self {
            Helper::SwapClean => "swap-clean",
            Helper::DropCaches => "drop-caches",
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Helper::SwapClean => "--swap-clean",
            Helper::DropCaches => "--drop-caches",
        }
    }
}

pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Blocking; may take seconds when sudo and swapoff are involved. The
/// caller redraws with a "started ..." status before calling.
pub fn run_helper(helper: Helper) -> String {
    let exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => return format!("{} error: {e}", helper.name()),
    };
    let use_sudo = !is_root();
    let mut cmd = if use_sudo {
        let mut c = Command::new("sudo");
        c.arg("-n").arg(&exe);
        c
    } else {
        Command::new(&exe)
    };
    cmd.arg(helper.flag());

    match cmd.output() {
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let stderr = String::from_utf8_lossy(&out.stderr);
            let msg = interpret(helper, use_sudo, out.status.code(), &stdout, &stderr);
            if !out.status.success() {
                warn!("{} failed: {msg}", helper.name());
            }
            msg
        }
        Err(e) => {
            warn!("{} spawn failed: {e}", helper.name());
            format!("{} error: {e}", helper.name())
        }
    }
}

fn interpret(
    helper: Helper,
    use_sudo: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> String {
    let name = helper.name();
    if code == Some(0) {
        return match helper {
            Helper::SwapClean => format!("{name} finished"),
            Helper::DropCaches => {
                let tail = last_line(stdout).unwrap_or("done");
                format!("{name}: {tail}")
            }
        };
    }
    if use_sudo && stderr.to_lowercase().contains("password") {
        //sudo -n refused: passwordless sudo is not configured
        return format!("{name} needs NOPASSWD sudo - add it via: sudo visudo -f /etc/sudoers.d/apptop");
    }
    let tail = last_line(stderr)
        .or_else(|| last_line(stdout))
        .map(|l| format!(": {l}"))
        .unwrap_or_default();
    match code {
        Some(c) => format!("{name} failed ({c}){tail}"),
        None => format!("{name} terminated by signal{tail}"),
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_messages() {
        assert_eq!(
            interpret(Helper::SwapClean, true, Some(0), "", ""),
            "swap-clean finished"
        );
        assert_eq!(
            interpret(Helper::DropCaches, false, Some(0), "freed 120 MB\n", ""),
            "drop-caches: freed 120 MB"
        );
        assert_eq!(
            interpret(Helper::DropCaches, false, Some(0), "", ""),
            "drop-caches: done"
        );
    }

    #[test]
    fn password_prompt_is_actionable() {
        let msg = interpret(
            Helper::SwapClean,
            true,
            Some(1),
            "",
            "sudo: a password is required\n",
        );
        assert!(msg.contains("NOPASSWD"));
    }

    #[test]
    fn failure_carries_last_output_line() {
        let msg = interpret(
            Helper::SwapClean,
            false,
            Some(2),
            "",
            "first\nNot enough RAM to clean swap safely.\n",
        );
        assert_eq!(
            msg,
            "swap-clean failed (2): Not enough RAM to clean swap safely."
        );
    }

    #[test]
    fn password_without_sudo_is_plain_failure() {
        let msg = interpret(Helper::DropCaches, false, Some(1), "", "password stuff\n");
        assert!(msg.starts_with("drop-caches failed (1)"));
    }
}
