//! Helpers for rendering remote URLs in logs and error messages.

use url::Url;

/// Replace any password embedded in `raw` with `***`.
///
/// Inputs that are not absolute URLs (scp-style `user@host:path`, local
/// paths) are returned unchanged; they cannot carry a password.
pub fn redact(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.password().is_some() && url.set_password(Some("***")).is_err() {
        return "<unprintable url>".to_string();
    }
    url.to_string()
}

/// Browsable location of `branch` on a Gogs/Gitea style host:
/// `<repo url without .git>/src/<branch>`.
pub fn branch_web_url(repo_url: &str, branch: &str) -> String {
    let redacted = redact(repo_url);
    let base = redacted.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!("{base}/src/{branch}")
}
