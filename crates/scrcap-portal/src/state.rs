//! The portal state machine's enumeration (§3 "Linux portal state machine",
//! §4.2 "Transitions").

/// Where the portal dialog sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalState {
    None,
    CreatingSession,
    SelectingSources,
    StartingStream,
}

impl Default for PortalState {
    fn default() -> Self {
        Self::None
    }
}

/// Generate a fresh `handle_token`: a prefix, the process id, and a random
/// 32-bit number (§4.2 "Request tokens"). The portal requires these to be
/// valid D-Bus object-path elements, so non-alphanumeric characters are
/// avoided by construction.
pub(crate) fn generate_handle_token(prefix: &str) -> String {
    let pid = std::process::id();
    let nonce: u32 = rand::random();
    format!("{prefix}_{pid}_{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_none() {
        assert_eq!(PortalState::default(), PortalState::None);
    }

    #[test]
    fn handle_tokens_are_unique_and_well_formed() {
        let a = generate_handle_token("scrcap");
        let b = generate_handle_token("scrcap");
        assert_ne!(a, b);
        assert!(a.starts_with("scrcap_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
