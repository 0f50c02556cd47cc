//! Cross-platform path helpers: `~`/environment-variable expansion, and the
//! default directories a router instance keeps its identity and config in.

use std::env;
use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory and any `$VAR` /
/// `${VAR}` references to their environment values. Falls back to the
/// literal input for anything it can't resolve rather than erroring —
/// this only ever feeds into default path construction, never parses
/// untrusted input.
pub fn expand_path(path: &str) -> PathBuf {
    let mut expanded = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    if path.starts_with('~') {
        if let Some(home) = home_dir() {
            expanded.push_str(&home.to_string_lossy());
            chars.next();
        }
    }

    while let Some(c) = chars.next() {
        if c == '$' {
            let mut name = String::new();
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }
            while let Some(&next) = chars.peek() {
                if braced && next == '}' {
                    chars.next();
                    break;
                }
                if !braced && !(next.is_alphanumeric() || next == '_') {
                    break;
                }
                name.push(next);
                chars.next();
            }
            match env::var(&name) {
                Ok(value) => expanded.push_str(&value),
                Err(_) => {
                    expanded.push('$');
                    expanded.push_str(&name);
                }
            }
        } else {
            expanded.push(c);
        }
    }

    PathBuf::from(expanded)
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Default directory a router instance keeps its long-term identity in.
pub fn default_keystore_dir() -> PathBuf {
    expand_path("~/.garlicrouter/keys")
}

/// Default directory a router instance keeps its configuration in.
pub fn default_config_dir() -> PathBuf {
    expand_path("~/.garlicrouter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde() {
        env::set_var("HOME", "/home/garlic");
        let expanded = expand_path("~/keys/router.dat");
        assert_eq!(expanded, PathBuf::from("/home/garlic/keys/router.dat"));
    }

    #[test]
    fn expands_braced_env_var() {
        env::set_var("GARLIC_DATA", "/var/lib/garlic");
        let expanded = expand_path("${GARLIC_DATA}/router.dat");
        assert_eq!(expanded, PathBuf::from("/var/lib/garlic/router.dat"));
    }

    #[test]
    fn expands_bare_env_var() {
        env::set_var("GARLIC_DATA2", "/srv/garlic");
        let expanded = expand_path("$GARLIC_DATA2/router.dat");
        assert_eq!(expanded, PathBuf::from("/srv/garlic/router.dat"));
    }

    #[test]
    fn leaves_unresolvable_var_untouched() {
        env::remove_var("GARLIC_DOES_NOT_EXIST");
        let expanded = expand_path("$GARLIC_DOES_NOT_EXIST/router.dat");
        assert_eq!(expanded, PathBuf::from("$GARLIC_DOES_NOT_EXIST/router.dat"));
    }

    #[test]
    fn plain_path_is_unchanged() {
        assert_eq!(expand_path("/etc/garlicrouter/router.dat"), PathBuf::from("/etc/garlicrouter/router.dat"));
    }
}
