//! Small helpers: data directory resolution and string shaping for logs.

use std::path::PathBuf;

/// ModelKit data directory (`~/.modelkit/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".modelkit")
}

/// Truncate to `max_len` characters, adding "..." if truncated. Unicode-safe.
///
/// Vendor error bodies can be whole HTML pages; logs only need the head.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(path.trim_start_matches('~').trim_start_matches('/'))
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate_string("404 page not found", 64), "404 page not found");
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "<html><body>Service Unavailable</body></html>";
        let result = truncate_string(body, 15);
        assert_eq!(result, "<html><body>...");
        assert_eq!(result.chars().count(), 15);
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_string("余额不足请充值后再试", 5), "余额...");
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/probe/dog.png");
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("probe/dog.png"));
    }

    #[test]
    fn test_expand_home_absolute() {
        assert_eq!(expand_home("/srv/dog.png"), PathBuf::from("/srv/dog.png"));
    }

    #[test]
    fn test_data_path_ends_with_modelkit() {
        assert!(get_data_path().ends_with(".modelkit"));
    }
}
