//! The fixed user directory.
//!
//! ECHO serves a small, statically known set of call-signs. The directory
//! is the authority on which handles exist and maps each handle to the
//! backing account identifier assigned at registration.

use std::collections::BTreeMap;

use crate::types::Handle;

/// The call-signs provisioned in a default deployment.
pub const DEFAULT_CALLSIGNS: [&str; 5] = ["NG", "VW", "ST", "U1", "U2"];

/// Static enumeration of valid handles plus the handle-to-account mapping.
#[derive(Debug, Clone)]
pub struct Directory {
    accounts: BTreeMap<Handle, Option<String>>,
}

impl Directory {
    /// Build a directory from an explicit handle set. Accounts start
    /// unbound.
    pub fn new(handles: impl IntoIterator<Item = Handle>) -> Self {
        Self {
            accounts: handles.into_iter().map(|h| (h, None)).collect(),
        }
    }

    /// Directory over [`DEFAULT_CALLSIGNS`].
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_CALLSIGNS
                .iter()
                .map(|cs| Handle::parse(cs).expect("default callsigns are valid")),
        )
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.accounts.contains_key(handle)
    }

    /// Parse a raw string and check it against the directory in one step.
    pub fn resolve(&self, raw: &str) -> Option<Handle> {
        let handle = Handle::parse(raw).ok()?;
        self.contains(&handle).then_some(handle)
    }

    /// All known handles, in canonical order.
    pub fn handles(&self) -> impl Iterator<Item = &Handle> {
        self.accounts.keys()
    }

    /// Record the backing account for a handle at registration time.
    /// Returns `false` if the handle is not in the directory.
    pub fn bind_account(&mut self, handle: &Handle, account_id: impl Into<String>) -> bool {
        match self.accounts.get_mut(handle) {
            Some(slot) => {
                *slot = Some(account_id.into());
                true
            }
            None => false,
        }
    }

    /// The account bound to a handle, if any.
    pub fn account_of(&self, handle: &Handle) -> Option<&str> {
        self.accounts.get(handle)?.as_deref()
    }

    /// Reverse lookup: which handle owns an account id.
    pub fn handle_for_account(&self, account_id: &str) -> Option<&Handle> {
        self.accounts
            .iter()
            .find(|(_, acc)| acc.as_deref() == Some(account_id))
            .map(|(h, _)| h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_present_and_canonical() {
        let dir = Directory::with_defaults();
        assert_eq!(dir.handles().count(), DEFAULT_CALLSIGNS.len());
        assert!(dir.resolve("ng").is_some());
        assert!(dir.resolve("zz").is_none());
    }

    #[test]
    fn account_binding_round_trip() {
        let mut dir = Directory::with_defaults();
        let ng = dir.resolve("NG").unwrap();

        assert!(dir.bind_account(&ng, "uid-123"));
        assert_eq!(dir.account_of(&ng), Some("uid-123"));
        assert_eq!(dir.handle_for_account("uid-123"), Some(&ng));
        assert_eq!(dir.handle_for_account("uid-999"), None);
    }
}
