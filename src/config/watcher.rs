//! Configuration file watcher for hot reload.
//!
//! Only the retry, call-timeout and cache-TTL policy is swapped into a
//! running gateway. Everything else (listener, provider set, vault, admin,
//! observability, request deadline) is fixed at startup, so edits to those
//! sections are reported and otherwise left for the next restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watches the gateway config file and forwards accepted policy changes.
pub struct ConfigWatcher {
    state: ReloadState,
}

impl ConfigWatcher {
    /// `current` is the config the gateway was started with; reloads are
    /// compared against it.
    pub fn new(
        path: &Path,
        current: GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let state = ReloadState {
            path: path.to_path_buf(),
            current,
            update_tx,
        };
        (Self { state }, update_rx)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.state.path.clone();
        let mut state = self.state;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    state.on_file_changed();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Gateway config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Gateway config watcher started");
        Ok(watcher)
    }
}

struct ReloadState {
    path: PathBuf,
    current: GatewayConfig,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ReloadState {
    /// Returns whether a new policy was sent to the gateway.
    fn on_file_changed(&mut self) -> bool {
        let next = match load_config(&self.path) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Rejected reloaded gateway config; keeping current policy"
                );
                return false;
            }
        };

        let diff = ReloadDiff::between(&self.current, &next);
        if diff.is_empty() {
            tracing::debug!(path = ?self.path, "Gateway config unchanged");
            return false;
        }
        if !diff.needs_restart.is_empty() {
            tracing::warn!(
                sections = ?diff.needs_restart,
                "Reloaded gateway config changes settings that only apply after restart"
            );
        }

        let sent = if diff.live.is_empty() {
            false
        } else {
            tracing::info!(
                sections = ?diff.live,
                max_retries = next.retries.max_retries,
                provider_call_secs = next.timeouts.provider_call_secs,
                cache_ttl_secs = next.cache.default_ttl_secs,
                "Applying reloaded gateway policy"
            );
            self.update_tx.send(next.clone()).is_ok()
        };
        self.current = next;
        sent
    }
}

/// Which config sections differ between two configs.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReloadDiff {
    live: Vec<&'static str>,
    needs_restart: Vec<&'static str>,
}

impl ReloadDiff {
    fn between(old: &GatewayConfig, new: &GatewayConfig) -> Self {
        let mut diff = Self::default();
        let mut check = |name: &'static str, live: bool, a: Value, b: Value| {
            if a != b {
                if live {
                    diff.live.push(name);
                } else {
                    diff.needs_restart.push(name);
                }
            }
        };

        check("retries", true, json(&old.retries), json(&new.retries));
        check(
            "timeouts.provider_call_secs",
            true,
            json(&old.timeouts.provider_call_secs),
            json(&new.timeouts.provider_call_secs),
        );
        check(
            "timeouts.request_secs",
            false,
            json(&old.timeouts.request_secs),
            json(&new.timeouts.request_secs),
        );
        check(
            "cache.default_ttl_secs",
            true,
            json(&old.cache.default_ttl_secs),
            json(&new.cache.default_ttl_secs),
        );
        check("cache", false, cache_fixed(&old.cache), cache_fixed(&new.cache));
        check(
            "providers.policy",
            true,
            providers(old, provider_policy),
            providers(new, provider_policy),
        );
        check(
            "providers",
            false,
            providers(old, provider_identity),
            providers(new, provider_identity),
        );
        check("listener", false, json(&old.listener), json(&new.listener));
        check("vault", false, json(&old.vault), json(&new.vault));
        check("observability", false, json(&old.observability), json(&new.observability));
        check("admin", false, json(&old.admin), json(&new.admin));
        diff
    }

    fn is_empty(&self) -> bool {
        self.live.is_empty() && self.needs_restart.is_empty()
    }
}

fn json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn cache_fixed(cache: &crate::config::CacheConfig) -> Value {
    serde_json::json!([cache.enabled, cache.max_entries, cache.sweep_interval_secs])
}

fn providers(
    config: &GatewayConfig,
    pick: fn(&crate::config::ProviderConfig) -> Value,
) -> Value {
    Value::Array(config.providers.iter().map(pick).collect())
}

fn provider_policy(provider: &crate::config::ProviderConfig) -> Value {
    serde_json::json!([provider.kind, json(&provider.retries), provider.timeout_secs])
}

fn provider_identity(provider: &crate::config::ProviderConfig) -> Value {
    serde_json::json!([
        provider.kind,
        provider.base_url,
        provider.default_model,
        provider.max_tokens
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const BASE: &str = r#"
        [retries]
        max_retries = 2

        [[providers]]
        kind = "openai"
    "#;

    fn state_with(
        dir: &tempfile::TempDir,
    ) -> (ReloadState, mpsc::UnboundedReceiver<GatewayConfig>) {
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, BASE).unwrap();
        let (watcher, rx) = ConfigWatcher::new(&path, parse_config(BASE).unwrap());
        (watcher.state, rx)
    }

    #[test]
    fn test_policy_change_is_forwarded_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, mut rx) = state_with(&dir);

        let edited = BASE.replace("max_retries = 2", "max_retries = 5");
        std::fs::write(&state.path, &edited).unwrap();
        assert!(state.on_file_changed());
        assert_eq!(rx.try_recv().unwrap().retries.max_retries, 5);

        // Editors often emit several events for one save.
        assert!(!state.on_file_changed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_reload_keeps_current_policy() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, mut rx) = state_with(&dir);

        std::fs::write(&state.path, "[retries]\nbackoff_factor = 0.5\n").unwrap();
        assert!(!state.on_file_changed());
        assert!(rx.try_recv().is_err());
        assert_eq!(state.current.retries.max_retries, 2);
    }

    #[test]
    fn test_restart_only_change_is_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut state, mut rx) = state_with(&dir);

        let edited = format!("[listener]\nbind_address = \"127.0.0.1:9999\"\n{}", BASE);
        std::fs::write(&state.path, &edited).unwrap();
        assert!(!state.on_file_changed());
        assert!(rx.try_recv().is_err());
        assert_eq!(state.current.listener.bind_address, "127.0.0.1:9999");
    }

    #[test]
    fn test_diff_separates_live_and_restart_sections() {
        let old = parse_config(BASE).unwrap();
        let mut new = old.clone();
        new.cache.default_ttl_secs += 60;
        new.providers[0].timeout_secs = Some(7);
        new.providers[0].default_model = Some("gpt-4o".into());
        new.timeouts.request_secs += 1;

        let diff = ReloadDiff::between(&old, &new);
        assert_eq!(diff.live, vec!["cache.default_ttl_secs", "providers.policy"]);
        assert_eq!(diff.needs_restart, vec!["timeouts.request_secs", "providers"]);
        assert!(ReloadDiff::between(&old, &old).is_empty());
    }
}
