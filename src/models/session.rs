use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const KEY_TOKEN: &str = "userToken";
pub const KEY_ROLE: &str = "userRole";
pub const KEY_DRIVER_ID: &str = "driverId";
pub const KEY_USER_DATA: &str = "userData";

/// Every persisted session key. Logout removes all of them.
pub const SESSION_KEYS: [&str; 4] = [KEY_TOKEN, KEY_ROLE, KEY_DRIVER_ID, KEY_USER_DATA];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "driver")]
    Driver,
    #[serde(rename = "pelanggan")]
    Customer,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "driver" => Some(Role::Driver),
            "pelanggan" => Some(Role::Customer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Customer => "pelanggan",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub driver_id: String,
    pub raw_user_data: Value,
}

impl Session {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Key/value pairs as they are written to persistent storage.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        vec![
            (KEY_TOKEN.to_string(), self.token.clone()),
            (KEY_ROLE.to_string(), self.role.as_str().to_string()),
            (KEY_DRIVER_ID.to_string(), self.driver_id.clone()),
            (KEY_USER_DATA.to_string(), self.raw_user_data.to_string()),
        ]
    }

    /// Rebuilds a session from persisted values. Token and role must both be
    /// present and the role must be known, otherwise there is no session.
    pub fn from_entries(
        token: Option<String>,
        role: Option<String>,
        driver_id: Option<String>,
        user_data: Option<String>,
    ) -> Option<Self> {
        let token = token.filter(|t| !t.is_empty())?;
        let role = role.as_deref().and_then(Role::parse)?;

        let raw_user_data = user_data
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| Value::Object(Default::default()));

        Some(Self {
            token,
            role,
            driver_id: driver_id.unwrap_or_default(),
            raw_user_data,
        })
    }
}

/// Placeholder profile card, filled from whatever the login response put in
/// the user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverProfile {
    pub driver_id: String,
    pub display_name: String,
    pub username: Option<String>,
}

impl DriverProfile {
    pub fn from_session(session: &Session) -> Self {
        let field = |key: &str| {
            session
                .raw_user_data
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let username = field("username");
        let display_name = field("nama_lengkap")
            .or_else(|| field("name"))
            .or_else(|| username.clone())
            .unwrap_or_else(|| "Driver".to_string());

        Self {
            driver_id: session.driver_id.clone(),
            display_name,
            username,
        }
    }
}
