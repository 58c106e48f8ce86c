//! Frame sandbox capabilities.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One relaxation of the default-deny frame sandbox.
///
/// Variants are ordered by their attribute token so a policy always
/// renders in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SandboxCapability {
    Downloads,
    Forms,
    Modals,
    PointerLock,
    Popups,
    SameOrigin,
    Scripts,
    TopNavigation,
}

impl SandboxCapability {
    pub const ALL: [SandboxCapability; 8] = [
        SandboxCapability::Downloads,
        SandboxCapability::Forms,
        SandboxCapability::Modals,
        SandboxCapability::PointerLock,
        SandboxCapability::Popups,
        SandboxCapability::SameOrigin,
        SandboxCapability::Scripts,
        SandboxCapability::TopNavigation,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            SandboxCapability::Downloads => "allow-downloads",
            SandboxCapability::Forms => "allow-forms",
            SandboxCapability::Modals => "allow-modals",
            SandboxCapability::PointerLock => "allow-pointer-lock",
            SandboxCapability::Popups => "allow-popups",
            SandboxCapability::SameOrigin => "allow-same-origin",
            SandboxCapability::Scripts => "allow-scripts",
            SandboxCapability::TopNavigation => "allow-top-navigation",
        }
    }
}

impl FromStr for SandboxCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.token() == s)
            .ok_or_else(|| format!("Unknown sandbox token: {}", s))
    }
}

/// The set of capabilities granted to a frame. Everything else is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxPolicy {
    allowed: BTreeSet<SandboxCapability>,
}

impl SandboxPolicy {
    /// Fully sandboxed: nothing allowed.
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// What a plugin UI gets: scripts, its own origin's storage, and forms.
    /// No top-level navigation, popups, modals or downloads.
    pub fn plugin_frame() -> Self {
        Self::deny_all()
            .allow(SandboxCapability::Scripts)
            .allow(SandboxCapability::SameOrigin)
            .allow(SandboxCapability::Forms)
    }

    pub fn allow(mut self, capability: SandboxCapability) -> Self {
        self.allowed.insert(capability);
        self
    }

    pub fn allows(&self, capability: SandboxCapability) -> bool {
        self.allowed.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = SandboxCapability> + '_ {
        self.allowed.iter().copied()
    }

    /// Value for an iframe `sandbox` attribute.
    pub fn to_attribute(&self) -> String {
        self.allowed
            .iter()
            .map(SandboxCapability::token)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn parse(attribute: &str) -> Result<Self, String> {
        attribute
            .split_whitespace()
            .map(SandboxCapability::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(|allowed| Self { allowed })
    }
}

impl fmt::Display for SandboxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_attribute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_frame_attribute() {
        let policy = SandboxPolicy::plugin_frame();
        assert_eq!(policy.to_attribute(), "allow-forms allow-same-origin allow-scripts");
        assert!(!policy.allows(SandboxCapability::TopNavigation));
        assert!(!policy.allows(SandboxCapability::Popups));
        assert_eq!(policy.capabilities().count(), 3);
    }

    #[test]
    fn test_parse_roundtrip_and_unknown_token() {
        let policy = SandboxPolicy::parse("allow-scripts  allow-forms allow-same-origin").unwrap();
        assert_eq!(policy, SandboxPolicy::plugin_frame());
        assert!(SandboxPolicy::parse("allow-everything").is_err());
        assert_eq!(SandboxPolicy::deny_all().to_attribute(), "");
    }
}
