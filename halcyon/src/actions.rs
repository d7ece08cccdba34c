//! Server actions available from the admin dashboard and how each one maps
//! onto the dashboard API and onto the virtualization control plane.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::{validate_owner_id, validate_reason, ValidationError};

/// Control-plane delay, in minutes, before a deleted server is destroyed.
pub const DELETE_DELAY_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerAction {
    Start,
    Stop,
    Restart,
    Suspend,
    Unsuspend,
    Transfer,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method + path pair. Paths are relative to the API root of whichever
/// service they address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
}

impl Endpoint {
    fn new(method: HttpMethod, path: String) -> Self {
        Self { method, path }
    }
}

impl ServerAction {
    pub const ALL: [ServerAction; 7] = [
        ServerAction::Start,
        ServerAction::Stop,
        ServerAction::Restart,
        ServerAction::Suspend,
        ServerAction::Unsuspend,
        ServerAction::Transfer,
        ServerAction::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServerAction::Start => "start",
            ServerAction::Stop => "stop",
            ServerAction::Restart => "restart",
            ServerAction::Suspend => "suspend",
            ServerAction::Unsuspend => "unsuspend",
            ServerAction::Transfer => "transfer",
            ServerAction::Delete => "delete",
        }
    }

    pub fn is_power(self) -> bool {
        matches!(
            self,
            ServerAction::Start | ServerAction::Stop | ServerAction::Restart
        )
    }

    /// Sensitive actions must carry a free-text reason for the audit log.
    pub fn requires_reason(self) -> bool {
        !self.is_power()
    }

    /// Actions the dashboard asks the operator to confirm twice.
    pub fn is_destructive(self) -> bool {
        matches!(self, ServerAction::Delete | ServerAction::Transfer)
    }

    /// The control plane's name for a power action.
    pub fn power_verb(self) -> Option<&'static str> {
        match self {
            ServerAction::Start => Some("boot"),
            ServerAction::Stop => Some("shutdown"),
            ServerAction::Restart => Some("restart"),
            _ => None,
        }
    }

    /// Route on the dashboard API (relative to `/api`).
    pub fn dashboard_endpoint(self, server_id: u64) -> Endpoint {
        let base = format!("/admin/vf/servers/{server_id}");
        match self {
            ServerAction::Start | ServerAction::Stop | ServerAction::Restart => {
                Endpoint::new(HttpMethod::Post, format!("{base}/power/{}", self.as_str()))
            }
            ServerAction::Suspend | ServerAction::Unsuspend | ServerAction::Transfer => {
                Endpoint::new(HttpMethod::Post, format!("{base}/{}", self.as_str()))
            }
            ServerAction::Delete => Endpoint::new(HttpMethod::Delete, base),
        }
    }

    /// Call on the control plane. Transfers need the new owner's id.
    pub fn control_plane_endpoint(
        self,
        server_id: u64,
        new_owner_id: Option<u64>,
    ) -> Result<Endpoint, ValidationError> {
        let base = format!("/servers/{server_id}");
        let endpoint = match self {
            ServerAction::Start | ServerAction::Stop | ServerAction::Restart => {
                let verb = self.power_verb().unwrap_or("restart");
                Endpoint::new(HttpMethod::Post, format!("{base}/power/{verb}"))
            }
            ServerAction::Suspend => Endpoint::new(HttpMethod::Post, format!("{base}/suspend")),
            ServerAction::Unsuspend => {
                Endpoint::new(HttpMethod::Post, format!("{base}/unsuspend"))
            }
            ServerAction::Transfer => {
                let owner = new_owner_id.ok_or(ValidationError::MissingOwner)?;
                Endpoint::new(HttpMethod::Put, format!("{base}/owner/{owner}"))
            }
            ServerAction::Delete => Endpoint::new(
                HttpMethod::Delete,
                format!("{base}?delay={DELETE_DELAY_MINUTES}"),
            ),
        };
        Ok(endpoint)
    }
}

impl fmt::Display for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAction(s.to_string()))
    }
}

/// An action whose form fields passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAction {
    pub action: ServerAction,
    pub reason: Option<String>,
    pub new_owner_id: Option<u64>,
}

impl ValidatedAction {
    /// Applies the dialog's rules: reason for sensitive actions, numeric owner
    /// for transfers. Owner ids on non-transfer actions are dropped.
    pub fn new(
        action: ServerAction,
        reason: Option<&str>,
        new_owner_id: Option<i64>,
    ) -> Result<Self, ValidationError> {
        let reason = validate_reason(action, reason)?;
        let new_owner_id = if action == ServerAction::Transfer {
            Some(validate_owner_id(new_owner_id)?)
        } else {
            None
        };
        Ok(Self {
            action,
            reason,
            new_owner_id,
        })
    }

    pub fn control_plane_endpoint(&self, server_id: u64) -> Result<Endpoint, ValidationError> {
        self.action.control_plane_endpoint(server_id, self.new_owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip_names() {
        for action in ServerAction::ALL {
            assert_eq!(action.as_str().parse::<ServerAction>(), Ok(action));
        }
        assert_eq!(
            "reboot".parse::<ServerAction>(),
            Err(ValidationError::UnknownAction("reboot".into()))
        );
        assert!("START".parse::<ServerAction>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ServerAction::Unsuspend).unwrap();
        assert_eq!(json, "\"unsuspend\"");
        let parsed: ServerAction = serde_json::from_str("\"transfer\"").unwrap();
        assert_eq!(parsed, ServerAction::Transfer);
    }

    #[test]
    fn test_dashboard_endpoints() {
        let cases = [
            (ServerAction::Start, HttpMethod::Post, "/admin/vf/servers/7/power/start"),
            (ServerAction::Stop, HttpMethod::Post, "/admin/vf/servers/7/power/stop"),
            (ServerAction::Restart, HttpMethod::Post, "/admin/vf/servers/7/power/restart"),
            (ServerAction::Suspend, HttpMethod::Post, "/admin/vf/servers/7/suspend"),
            (ServerAction::Unsuspend, HttpMethod::Post, "/admin/vf/servers/7/unsuspend"),
            (ServerAction::Transfer, HttpMethod::Post, "/admin/vf/servers/7/transfer"),
            (ServerAction::Delete, HttpMethod::Delete, "/admin/vf/servers/7"),
        ];
        for (action, method, path) in cases {
            let ep = action.dashboard_endpoint(7);
            assert_eq!(ep.method, method, "{action}");
            assert_eq!(ep.path, path, "{action}");
        }
    }

    #[test]
    fn test_control_plane_endpoints() {
        let ep = ServerAction::Start.control_plane_endpoint(12, None).unwrap();
        assert_eq!((ep.method, ep.path.as_str()), (HttpMethod::Post, "/servers/12/power/boot"));

        let ep = ServerAction::Stop.control_plane_endpoint(12, None).unwrap();
        assert_eq!(ep.path, "/servers/12/power/shutdown");

        let ep = ServerAction::Restart.control_plane_endpoint(12, None).unwrap();
        assert_eq!(ep.path, "/servers/12/power/restart");

        let ep = ServerAction::Suspend.control_plane_endpoint(12, None).unwrap();
        assert_eq!((ep.method, ep.path.as_str()), (HttpMethod::Post, "/servers/12/suspend"));

        let ep = ServerAction::Transfer.control_plane_endpoint(12, Some(99)).unwrap();
        assert_eq!((ep.method, ep.path.as_str()), (HttpMethod::Put, "/servers/12/owner/99"));

        let ep = ServerAction::Delete.control_plane_endpoint(12, None).unwrap();
        assert_eq!((ep.method, ep.path.as_str()), (HttpMethod::Delete, "/servers/12?delay=5"));
    }

    #[test]
    fn test_transfer_without_owner_fails() {
        assert_eq!(
            ServerAction::Transfer.control_plane_endpoint(1, None),
            Err(ValidationError::MissingOwner)
        );
    }

    #[test]
    fn test_validated_action_rules() {
        let v = ValidatedAction::new(ServerAction::Transfer, Some("customer request"), Some(5)).unwrap();
        assert_eq!(v.new_owner_id, Some(5));
        assert_eq!(v.reason.as_deref(), Some("customer request"));

        assert_eq!(
            ValidatedAction::new(ServerAction::Transfer, Some("x"), None),
            Err(ValidationError::MissingOwner)
        );
        assert_eq!(
            ValidatedAction::new(ServerAction::Delete, None, None),
            Err(ValidationError::ReasonRequired(ServerAction::Delete))
        );

        let v = ValidatedAction::new(ServerAction::Restart, None, Some(5)).unwrap();
        assert_eq!(v.new_owner_id, None);
        assert_eq!(v.reason, None);
    }

    #[test]
    fn test_flags() {
        assert!(ServerAction::Start.is_power());
        assert!(!ServerAction::Suspend.is_power());
        assert!(ServerAction::Delete.is_destructive());
        assert!(!ServerAction::Stop.is_destructive());
        assert_eq!(ServerAction::Suspend.power_verb(), None);
    }
}
