//! Notification text.

use deploy::{DeployIntent, SyncOutcome};

/// Host name used when neither the configuration nor `$HOSTNAME` provides one.
pub const FALLBACK_HOST: &str = "hookdeploy";

/// Picks the host name shown in subjects.
pub fn resolve_host(configured: Option<&str>) -> String {
    configured
        .filter(|h| !h.trim().is_empty())
        .map(|h| h.trim().to_string())
        .or_else(|| {
            std::env::var("HOSTNAME")
                .ok()
                .filter(|h| !h.trim().is_empty())
        })
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

/// `"<host> - git pull - <repo>"`, with a failure marker when the sync failed.
pub fn subject(host: &str, intent: &DeployIntent, outcome: &SyncOutcome) -> String {
    let status = if outcome.succeeded { "" } else { " (FAILED)" };
    format!("{host} - git pull - {}{status}", intent.repo_name())
}

/// Plain-text body naming the provider, the directory, and the git output.
pub fn body(intent: &DeployIntent, outcome: &SyncOutcome) -> String {
    let result = if outcome.succeeded {
        "Resulting in the following output"
    } else {
        "The pull FAILED with the following output"
    };
    format!(
        "A {provider} webhook triggered a pull of branch '{branch}' into the following directory:\n\n\
         {dir}\n\n\
         {result}:\n\n\
         {log}",
        provider = intent.provider(),
        branch = intent.branch(),
        dir = intent.local_dir().display(),
        log = outcome.log_text,
    )
}
