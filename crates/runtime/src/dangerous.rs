//! Closed dangerous-command pattern list for the Executor (spec.md §4.6,
//! scenario B). Matched commands are never spawned.

use once_cell::sync::Lazy;
use regex::Regex;

static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"rm\s+(-\w*r\w*f\w*|-\w*f\w*r\w*)\s+(/\s*$|/\*|/bin|/etc|/usr|/home\s*$|~\s*$)",
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;",
        r"\bmkfs(\.\w+)?\b",
        r"\bdd\b.*\bof=/dev/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("dangerous pattern must compile"))
    .collect()
});

/// `None` if the command is safe to run; `Some(reason)` if it matches the
/// dangerous-pattern list and must be blocked before it is ever spawned.
pub fn check(command: &str) -> Option<&'static str> {
    let normalized = command.trim();
    if PATTERNS.iter().any(|re| re.is_match(normalized)) {
        Some("Command blocked: potentially dangerous operation")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_rm_rf_root() {
        assert!(check("rm -rf /").is_some());
    }

    #[test]
    fn blocks_fork_bomb() {
        assert!(check(":(){ :|:& };:").is_some());
    }

    #[test]
    fn blocks_mkfs_and_raw_dd_to_device() {
        assert!(check("mkfs.ext4 /dev/sda1").is_some());
        assert!(check("dd if=/dev/zero of=/dev/sda").is_some());
    }

    #[test]
    fn allows_ordinary_commands() {
        assert!(check("ls -la /tmp").is_none());
        assert!(check("rm -rf ./build").is_none());
    }
}
