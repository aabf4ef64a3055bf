//! Security contexts a controller client or service can run in
//!
//! A screen reader runs one instance on the interactive user desktop and,
//! optionally, a separate privileged instance on the secure (login/lock)
//! screen. Text delivered to the wrong instance could leak secure-screen
//! content, so every connection is gated by [`SecurityContext::admits`] and
//! [`SecurityContext::admits_peer`] before any request is sent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The desktop/session a process belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityContext {
    /// The interactive user session
    Normal,
    /// The secure desktop (login, lock screen, elevation prompts)
    Secure,
}

impl SecurityContext {
    /// Context of the current process
    ///
    /// Secure-desktop instances run under the system account, so a process
    /// with effective uid 0 is treated as living in the secure context.
    pub fn detect() -> Self {
        if effective_uid() == 0 {
            Self::Secure
        } else {
            Self::Normal
        }
    }

    /// The other context
    pub fn opposite(self) -> Self {
        match self {
            Self::Normal => Self::Secure,
            Self::Secure => Self::Normal,
        }
    }

    /// Whether a caller in `self` may talk to a service in `service`
    pub fn admits(self, service: SecurityContext) -> bool {
        self == service
    }

    /// Whether a peer process owned by `peer_uid` may be trusted by a
    /// process owned by `own_uid`
    ///
    /// Only the same user or the system account qualify. Anything else means
    /// the endpoint was squatted by another user.
    pub fn admits_peer(own_uid: u32, peer_uid: u32) -> bool {
        peer_uid == own_uid || peer_uid == 0
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Secure => f.write_str("secure"),
        }
    }
}

/// Effective uid of this process
pub(crate) fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_only_admit_themselves() {
        assert!(SecurityContext::Normal.admits(SecurityContext::Normal));
        assert!(SecurityContext::Secure.admits(SecurityContext::Secure));
        assert!(!SecurityContext::Normal.admits(SecurityContext::Secure));
        assert!(!SecurityContext::Secure.admits(SecurityContext::Normal));
    }

    #[test]
    fn test_peer_must_be_same_user_or_system() {
        assert!(SecurityContext::admits_peer(1000, 1000));
        assert!(SecurityContext::admits_peer(1000, 0));
        assert!(!SecurityContext::admits_peer(1000, 1001));
    }

    #[test]
    fn test_detect_follows_effective_uid() {
        let expected = if effective_uid() == 0 {
            SecurityContext::Secure
        } else {
            SecurityContext::Normal
        };
        assert_eq!(SecurityContext::detect(), expected);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(SecurityContext::Normal.opposite(), SecurityContext::Secure);
        assert_eq!(SecurityContext::Secure.opposite(), SecurityContext::Normal);
    }
}
