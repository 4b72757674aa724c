//! config/discovery.rs
//! Locating external tool executables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Find an executable: a usable `override_path` wins, otherwise every
/// `PATH` entry is probed (also with `.exe` on Windows).
pub fn locate_executable(name: &str, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if is_executable_file(path) {
            return Some(path.to_path_buf());
        }
        warn!(
            target: "ultragz::candidate",
            tool = name,
            path = %path.display(),
            "configured executable is not usable; searching PATH"
        );
    }

    let found = env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            candidate_names(name)
                .into_iter()
                .map(|n| dir.join(n))
                .find(|p| is_executable_file(p))
        })
    });
    match &found {
        Some(path) => debug!(target: "ultragz::candidate", tool = name, path = %path.display(), "tool found"),
        None => debug!(target: "ultragz::candidate", tool = name, "tool not found"),
    }
    found
}

fn candidate_names(name: &str) -> Vec<String> {
    if cfg!(windows) && !name.ends_with(".exe") {
        vec![name.to_string(), format!("{name}.exe")]
    } else {
        vec![name.to_string()]
    }
}

pub fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn finds_sh_on_path() {
        let sh = locate_executable("sh", None).expect("sh on PATH");
        assert!(sh.ends_with("sh"));
    }

    #[test]
    fn override_wins_when_executable() {
        let path = Path::new("/bin/sh");
        assert_eq!(locate_executable("anything", Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn missing_tool_is_none() {
        assert_eq!(locate_executable("definitely-not-a-real-tool-xyz", None), None);
        assert!(!is_executable_file(Path::new("/")));
    }
}
