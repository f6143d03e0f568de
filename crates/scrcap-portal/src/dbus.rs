//! Raw D-Bus proxy definitions for the portal interfaces named in §6
//! ("Portal wire layer"): `org.freedesktop.portal.ScreenCast`,
//! `org.freedesktop.portal.Session`, `org.freedesktop.portal.Request`.
//!
//! These are hand-written `zbus::proxy` traits rather than a re-export of a
//! higher-level portal crate, so the session machine in [`crate::session`]
//! can implement the explicit request-token / signal-subscription protocol
//! §4.2 and its design notes require.

use std::collections::HashMap;

use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

#[zbus::proxy(
    interface = "org.freedesktop.portal.ScreenCast",
    default_service = "org.freedesktop.portal.Desktop",
    default_path = "/org/freedesktop/portal/desktop"
)]
pub(crate) trait ScreenCast {
    fn create_session(
        &self,
        options: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;

    fn select_sources(
        &self,
        session_handle: &ObjectPath<'_>,
        options: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;

    fn start(
        &self,
        session_handle: &ObjectPath<'_>,
        parent_window: &str,
        options: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;

    fn open_pipe_wire_remote(
        &self,
        session_handle: &ObjectPath<'_>,
        options: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<zbus::zvariant::OwnedFd>;

    #[zbus(property)]
    fn available_source_types(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn available_cursor_modes(&self) -> zbus::Result<u32>;
}

#[zbus::proxy(
    interface = "org.freedesktop.portal.Session",
    default_service = "org.freedesktop.portal.Desktop"
)]
pub(crate) trait Session {
    fn close(&self) -> zbus::Result<()>;

    #[zbus(signal)]
    fn closed(&self) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.portal.Request",
    default_service = "org.freedesktop.portal.Desktop"
)]
pub(crate) trait Request {
    #[zbus(signal)]
    fn response(&self, response: u32, results: HashMap<String, OwnedValue>) -> zbus::Result<()>;
}

/// Read `session_handle` out of a `CreateSession`/`Start` response body,
/// accepting it as either an object path or a plain string (§6: "The
/// `session_handle` in the CreateSession response is accepted as either `o`
/// or `s` for robustness").
pub(crate) fn session_handle_from_results(
    results: &HashMap<String, OwnedValue>,
) -> Option<OwnedObjectPath> {
    let value = results.get("session_handle")?;
    if let Ok(path) = ObjectPath::try_from(value.clone()) {
        return Some(path.into());
    }
    if let Ok(s) = String::try_from(value.clone()) {
        return ObjectPath::try_from(s).ok().map(OwnedObjectPath::from);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::Value;

    #[test]
    fn session_handle_accepted_as_object_path() {
        let mut results = HashMap::new();
        let path = ObjectPath::try_from("/org/freedesktop/portal/desktop/session/1/1").unwrap();
        results.insert(
            "session_handle".to_string(),
            OwnedValue::try_from(Value::from(path.clone())).unwrap(),
        );
        let parsed = session_handle_from_results(&results).unwrap();
        assert_eq!(parsed.as_str(), path.as_str());
    }

    #[test]
    fn session_handle_accepted_as_plain_string() {
        let mut results = HashMap::new();
        results.insert(
            "session_handle".to_string(),
            OwnedValue::try_from(Value::from("/org/freedesktop/portal/desktop/session/1/1"))
                .unwrap(),
        );
        let parsed = session_handle_from_results(&results).unwrap();
        assert_eq!(
            parsed.as_str(),
            "/org/freedesktop/portal/desktop/session/1/1"
        );
    }

    #[test]
    fn missing_session_handle_is_none() {
        let results = HashMap::new();
        assert!(session_handle_from_results(&results).is_none());
    }
}
