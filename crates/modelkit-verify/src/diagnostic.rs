//! Base-URL diagnostics.
//!
//! Turns a failed call into one concrete fix for the URL the user typed.
//! Rules are checked in priority order and the first match wins:
//!
//! 1. URL contains `/chat/completions` → strip it
//! 2. URL ends with `/` → strip the slash
//! 3. `404` / `connection refused` against a local host → use the host alias
//!    (the service likely runs on the machine hosting our container)
//! 4. remote host, no path, generic provider → append `/v1`
//! 5. no `scheme://` → add one
//!
//! Pure: no I/O, same input, same output.

use std::fmt;

use serde::Serialize;
use url::Url;

use modelkit_core::config::DiagnosticsConfig;
use modelkit_core::ProviderId;

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "0.0.0.0", "::1", "[::1]"];

/// Which host-machine alias applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            HostPlatform::Linux
        } else {
            HostPlatform::Other
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    StripChatCompletions,
    StripTrailingSlash,
    UseHostAlias,
    AppendV1Path,
    AddScheme,
}

/// One actionable fix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiagnosticSuggestion {
    pub kind: FixKind,
    pub fixed_url: String,
    pub message: String,
}

impl fmt::Display for DiagnosticSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl DiagnosticSuggestion {
    fn new(kind: FixKind, fixed_url: String) -> Self {
        let message = match kind {
            FixKind::StripChatCompletions => {
                format!("Remove the /chat/completions path from the API address: {fixed_url}")
            }
            FixKind::StripTrailingSlash => {
                format!("Remove the trailing '/' from the API address: {fixed_url}")
            }
            FixKind::UseHostAlias => {
                format!("Use the host machine address in the API address: {fixed_url}")
            }
            FixKind::AppendV1Path => format!("Append /v1 to the API address: {fixed_url}"),
            FixKind::AddScheme => format!("Add a scheme to the API address: {fixed_url}"),
        };
        Self {
            kind,
            fixed_url,
            message,
        }
    }
}

fn is_local(host: &str) -> bool {
    LOCAL_HOSTS.contains(&host)
}

/// Swap `host` (as normalized by `Url`, lowercase) for `alias` inside the
/// text the user typed, leaving the rest untouched.
fn replace_host(rest: &str, host: &str, alias: &str) -> Option<String> {
    let start = rest.to_ascii_lowercase().find(host)?;
    let end = start + host.len();
    Some(format!("{}{}{}", &rest[..start], alias, &rest[end..]))
}

// ─────────────────────────────────────────────
// DiagnosticAdvisor
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct DiagnosticAdvisor {
    linux_host_alias: String,
    default_host_alias: String,
}

impl Default for DiagnosticAdvisor {
    fn default() -> Self {
        Self::new(&DiagnosticsConfig::default())
    }
}

impl DiagnosticAdvisor {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            linux_host_alias: config.linux_host_alias.clone(),
            default_host_alias: config.default_host_alias.clone(),
        }
    }

    /// [`suggest_for`](Self::suggest_for) on the platform we are running on.
    pub fn suggest(
        &self,
        error_text: &str,
        base_url: &str,
        provider: ProviderId,
    ) -> Option<DiagnosticSuggestion> {
        self.suggest_for(HostPlatform::current(), error_text, base_url, provider)
    }

    pub fn suggest_for(
        &self,
        platform: HostPlatform,
        error_text: &str,
        base_url: &str,
        provider: ProviderId,
    ) -> Option<DiagnosticSuggestion> {
        let base_url = base_url.trim();
        if base_url.is_empty() {
            return None;
        }

        if base_url.contains("/chat/completions") {
            let fixed = base_url
                .replacen("/chat/completions", "", 1)
                .trim_end_matches('/')
                .to_string();
            return Some(DiagnosticSuggestion::new(FixKind::StripChatCompletions, fixed));
        }

        if base_url.ends_with('/') {
            let fixed = base_url.trim_end_matches('/').to_string();
            return Some(DiagnosticSuggestion::new(FixKind::StripTrailingSlash, fixed));
        }

        let Some((scheme, rest)) = base_url.split_once("://") else {
            return self.add_scheme(base_url);
        };
        let url = Url::parse(base_url).ok()?;
        let host = url.host_str()?;
        let local = is_local(host);

        let error = error_text.to_lowercase();
        if local && (error.contains("404") || error.contains("connection refused")) {
            let alias = match platform {
                HostPlatform::Linux => &self.linux_host_alias,
                HostPlatform::Other => &self.default_host_alias,
            };
            let fixed = format!("{}://{}", scheme, replace_host(rest, host, alias)?);
            return Some(DiagnosticSuggestion::new(FixKind::UseHostAlias, fixed));
        }

        let has_path = rest.contains('/');
        if !local && !has_path && provider == ProviderId::Other {
            return Some(DiagnosticSuggestion::new(
                FixKind::AppendV1Path,
                format!("{}/v1", base_url),
            ));
        }

        None
    }

    fn add_scheme(&self, base_url: &str) -> Option<DiagnosticSuggestion> {
        let host = Url::parse(&format!("http://{}", base_url))
            .ok()?
            .host_str()?
            .to_string();
        let scheme = if is_local(&host) { "http" } else { "https" };
        Some(DiagnosticSuggestion::new(
            FixKind::AddScheme,
            format!("{}://{}", scheme, base_url),
        ))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn advisor() -> DiagnosticAdvisor {
        DiagnosticAdvisor::default()
    }

    fn fix(platform: HostPlatform, err: &str, url: &str, p: ProviderId) -> Option<(FixKind, String)> {
        advisor()
            .suggest_for(platform, err, url, p)
            .map(|s| (s.kind, s.fixed_url))
    }

    #[test]
    fn test_local_404_on_linux() {
        assert_eq!(
            fix(
                HostPlatform::Linux,
                "upstream error (status 404): 404 page not found",
                "http://localhost:11434/api/tags",
                ProviderId::Ollama
            ),
            Some((FixKind::UseHostAlias, "http://172.17.0.1:11434/api/tags".into()))
        );
    }

    #[test]
    fn test_uppercase_local_host_is_rewritten() {
        assert_eq!(
            fix(
                HostPlatform::Linux,
                "404 page not found",
                "http://LOCALHOST:11434/api/tags",
                ProviderId::Ollama
            ),
            Some((FixKind::UseHostAlias, "http://172.17.0.1:11434/api/tags".into()))
        );
    }

    #[test]
    fn test_local_connection_refused_elsewhere() {
        assert_eq!(
            fix(
                HostPlatform::Other,
                "error sending request: Connection refused (os error 111)",
                "http://127.0.0.1:8000/v1",
                ProviderId::Other
            ),
            Some((FixKind::UseHostAlias, "http://host.docker.internal:8000/v1".into()))
        );
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(
            fix(HostPlatform::Linux, "anything", "https://api.example.com/v1/", ProviderId::OpenAi),
            Some((FixKind::StripTrailingSlash, "https://api.example.com/v1".into()))
        );
    }

    #[test]
    fn test_chat_completions_wins() {
        assert_eq!(
            fix(
                HostPlatform::Linux,
                "404",
                "http://localhost:8000/v1/chat/completions/",
                ProviderId::Other
            ),
            Some((FixKind::StripChatCompletions, "http://localhost:8000/v1".into()))
        );
    }

    #[test]
    fn test_append_v1_for_other_only() {
        assert_eq!(
            fix(HostPlatform::Linux, "401", "https://llm.example.com", ProviderId::Other),
            Some((FixKind::AppendV1Path, "https://llm.example.com/v1".into()))
        );
        assert_eq!(
            fix(HostPlatform::Linux, "401", "https://llm.example.com", ProviderId::DeepSeek),
            None
        );
    }

    #[test]
    fn test_local_without_matching_error() {
        assert_eq!(
            fix(HostPlatform::Linux, "401 unauthorized", "http://localhost:11434", ProviderId::Ollama),
            None
        );
    }

    #[test]
    fn test_missing_scheme() {
        assert_eq!(
            fix(HostPlatform::Linux, "builder error", "localhost:11434", ProviderId::Ollama),
            Some((FixKind::AddScheme, "http://localhost:11434".into()))
        );
        assert_eq!(
            fix(HostPlatform::Linux, "builder error", "api.example.com/v1", ProviderId::Other),
            Some((FixKind::AddScheme, "https://api.example.com/v1".into()))
        );
    }

    #[test]
    fn test_deterministic() {
        let a = advisor().suggest_for(HostPlatform::Linux, "404", "http://localhost:1/x", ProviderId::Other);
        let b = advisor().suggest_for(HostPlatform::Linux, "404", "http://localhost:1/x", ProviderId::Other);
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_alias_from_config() {
        let advisor = DiagnosticAdvisor::new(&DiagnosticsConfig {
            linux_host_alias: "10.0.0.1".into(),
            default_host_alias: "host.docker.internal".into(),
        });
        let s = advisor
            .suggest_for(HostPlatform::Linux, "404", "http://localhost:9997/v1", ProviderId::Other)
            .unwrap();
        assert_eq!(s.fixed_url, "http://10.0.0.1:9997/v1");
        assert!(s.to_string().contains("http://10.0.0.1:9997/v1"));
    }

    #[test]
    fn test_empty_url() {
        assert_eq!(fix(HostPlatform::Linux, "404", "", ProviderId::Other), None);
    }
}
