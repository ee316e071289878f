//! Input method backend detection and protocol quirks
//!
//! Each input method framework behaves a little differently: some answer key
//! events asynchronously and re-post them later, some listen to keys with a
//! snooper so consumed keys never reach the toolkit. The backend is detected
//! once, when the primary context is created, and consulted from then on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

/// Known input method frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// fcitx 4.x or earlier
    Fcitx,
    Fcitx5,
    IBus,
    Iiimf,
    Scim,
    Uim,
    Wayland,
    Unknown,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Fcitx => "fcitx",
            BackendId::Fcitx5 => "fcitx5",
            BackendId::IBus => "ibus",
            BackendId::Iiimf => "iiim",
            BackendId::Scim => "scim",
            BackendId::Uim => "uim",
            BackendId::Wayland => "wayland",
            BackendId::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fcitx" => Ok(BackendId::Fcitx),
            "fcitx5" => Ok(BackendId::Fcitx5),
            "ibus" => Ok(BackendId::IBus),
            "iiim" | "iiimf" => Ok(BackendId::Iiimf),
            "scim" => Ok(BackendId::Scim),
            "uim" => Ok(BackendId::Uim),
            "wayland" => Ok(BackendId::Wayland),
            other => Err(CoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// Capabilities the bridge consults instead of branching on the backend.
pub trait BackendQuirks: fmt::Debug {
    fn id(&self) -> BackendId;

    /// Filtered key events may be answered later and re-posted to us.
    fn supports_async_key_handling(&self) -> bool;

    /// Key events the input method consumes never reach the toolkit.
    fn uses_key_snooping(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct IBus {
    sync_mode: bool,
}

impl BackendQuirks for IBus {
    fn id(&self) -> BackendId {
        BackendId::IBus
    }

    fn supports_async_key_handling(&self) -> bool {
        !self.sync_mode
    }
}

#[derive(Debug)]
struct Fcitx {
    sync_mode: bool,
}

impl BackendQuirks for Fcitx {
    fn id(&self) -> BackendId {
        BackendId::Fcitx
    }

    fn supports_async_key_handling(&self) -> bool {
        !self.sync_mode
    }
}

#[derive(Debug)]
struct Fcitx5;

impl BackendQuirks for Fcitx5 {
    fn id(&self) -> BackendId {
        BackendId::Fcitx5
    }

    fn supports_async_key_handling(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Uim {
    key_snooper: bool,
}

impl BackendQuirks for Uim {
    fn id(&self) -> BackendId {
        BackendId::Uim
    }

    fn supports_async_key_handling(&self) -> bool {
        false
    }

    fn uses_key_snooping(&self) -> bool {
        self.key_snooper
    }
}

/// Backends with no quirks: iiimf, scim, wayland and anything unrecognised.
#[derive(Debug)]
struct Synchronous(BackendId);

impl BackendQuirks for Synchronous {
    fn id(&self) -> BackendId {
        self.0
    }

    fn supports_async_key_handling(&self) -> bool {
        false
    }
}

/// Forces synchronous key handling on top of another backend.
#[derive(Debug)]
struct ForcedSync(Box<dyn BackendQuirks>);

impl BackendQuirks for ForcedSync {
    fn id(&self) -> BackendId {
        self.0.id()
    }

    fn supports_async_key_handling(&self) -> bool {
        false
    }

    fn uses_key_snooping(&self) -> bool {
        self.0.uses_key_snooping()
    }
}

/// Options that come from user settings rather than the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    pub uim_uses_key_snooper: bool,
    pub force_sync_mode: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            uim_uses_key_snooper: true,
            force_sync_mode: false,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Resolve the backend behind an XIM context from `XMODIFIERS` (`@im=name`).
fn xim_server(env: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    let modifiers = env("XMODIFIERS")?;
    modifiers
        .split('@')
        .filter_map(|part| part.strip_prefix("im="))
        .map(|name| name.trim().to_ascii_lowercase())
        .find(|name| !name.is_empty())
}

/// Pick the quirks implementation for a native context module id.
///
/// `env` looks up environment variables; pass `|k| std::env::var(k).ok()`
/// outside tests.
pub fn detect_backend(
    module_id: &str,
    env: &dyn Fn(&str) -> Option<String>,
    options: DetectOptions,
) -> Box<dyn BackendQuirks> {
    let mut name = module_id.trim().to_ascii_lowercase();
    if name == "xim"
        && let Some(server) = xim_server(env)
    {
        debug!("xim context served by {:?}", server);
        name = server;
    }

    let sync_env = |var: &str| env(var).is_some_and(|v| is_truthy(&v));

    let quirks: Box<dyn BackendQuirks> = match name.parse::<BackendId>() {
        Ok(BackendId::IBus) => Box::new(IBus {
            sync_mode: sync_env("IBUS_ENABLE_SYNC_MODE"),
        }),
        Ok(BackendId::Fcitx) => Box::new(Fcitx {
            sync_mode: sync_env("FCITX_ENABLE_SYNC_MODE"),
        }),
        Ok(BackendId::Fcitx5) => Box::new(Fcitx5),
        Ok(BackendId::Uim) => Box::new(Uim {
            key_snooper: options.uim_uses_key_snooper,
        }),
        Ok(id) => Box::new(Synchronous(id)),
        Err(e) => {
            debug!("{}", e);
            Box::new(Synchronous(BackendId::Unknown))
        }
    };

    let quirks = if options.force_sync_mode && quirks.supports_async_key_handling() {
        Box::new(ForcedSync(quirks))
    } else {
        quirks
    };

    debug!(
        "backend: {} (async={}, snooped={})",
        quirks.id(),
        quirks.supports_async_key_handling(),
        quirks.uses_key_snooping()
    );
    quirks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_ibus_is_async_by_default() {
        let quirks = detect_backend("ibus", &no_env, DetectOptions::default());
        assert_eq!(quirks.id(), BackendId::IBus);
        assert!(quirks.supports_async_key_handling());
        assert!(!quirks.uses_key_snooping());
    }

    #[test]
    fn test_ibus_sync_mode_from_env() {
        let env = |k: &str| (k == "IBUS_ENABLE_SYNC_MODE").then(|| "1".to_string());
        let quirks = detect_backend("ibus", &env, DetectOptions::default());
        assert!(!quirks.supports_async_key_handling());

        let env = |k: &str| (k == "IBUS_ENABLE_SYNC_MODE").then(|| "false".to_string());
        let quirks = detect_backend("ibus", &env, DetectOptions::default());
        assert!(quirks.supports_async_key_handling());
    }

    #[test]
    fn test_fcitx_variants() {
        let fcitx = detect_backend("fcitx", &no_env, DetectOptions::default());
        assert_eq!(fcitx.id(), BackendId::Fcitx);
        assert!(fcitx.supports_async_key_handling());

        let fcitx5 = detect_backend("fcitx5", &no_env, DetectOptions::default());
        assert_eq!(fcitx5.id(), BackendId::Fcitx5);
        assert!(fcitx5.supports_async_key_handling());
    }

    #[test]
    fn test_uim_snooper_follows_option() {
        let quirks = detect_backend("uim", &no_env, DetectOptions::default());
        assert!(quirks.uses_key_snooping());

        let options = DetectOptions {
            uim_uses_key_snooper: false,
            ..DetectOptions::default()
        };
        let quirks = detect_backend("uim", &no_env, options);
        assert!(!quirks.uses_key_snooping());
    }

    #[test]
    fn test_xim_resolves_through_xmodifiers() {
        let env = |k: &str| (k == "XMODIFIERS").then(|| "@im=fcitx".to_string());
        let quirks = detect_backend("xim", &env, DetectOptions::default());
        assert_eq!(quirks.id(), BackendId::Fcitx);
    }

    #[test]
    fn test_unknown_module_is_synchronous() {
        let quirks = detect_backend("gtk-im-context-simple", &no_env, DetectOptions::default());
        assert_eq!(quirks.id(), BackendId::Unknown);
        assert!(!quirks.supports_async_key_handling());
    }

    #[test]
    fn test_force_sync_mode() {
        let options = DetectOptions {
            force_sync_mode: true,
            ..DetectOptions::default()
        };
        let quirks = detect_backend("fcitx5", &no_env, options);
        assert_eq!(quirks.id(), BackendId::Fcitx5);
        assert!(!quirks.supports_async_key_handling());
    }

    #[test]
    fn test_backend_id_parse() {
        assert_eq!("IBus".parse::<BackendId>().unwrap(), BackendId::IBus);
        assert!("nope".parse::<BackendId>().is_err());
    }
}
