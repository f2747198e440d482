use egui::Color32;
use serde::Deserialize;
use serde::Serialize;

/// Back-office roles known to the school website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[serde(alias = "super_admin")]
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::SuperAdmin];

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::SuperAdmin => "Super Admin",
        }
    }

    pub fn color(&self) -> Color32 {
        match self {
            Role::Admin => Color32::from_rgb(0x25, 0x63, 0xEB),
            Role::SuperAdmin => Color32::from_rgb(0x93, 0x33, 0xEA),
        }
    }
}

/// Bearer token issued by the website's login endpoint, pasted in by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub token: Option<String>,
    pub role: Option<Role>,
    pub user_name: String,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|token| !token.is_empty())
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    /// Both roles may author the tour; browsing needs no session at all.
    pub fn can_edit(&self) -> bool {
        self.is_signed_in() && self.role.is_some()
    }

    pub fn sign_out(&mut self) {
        self.token = None;
    }

    pub fn describe(&self) -> String {
        match (self.is_signed_in(), self.role) {
            (false, _) => "Not signed in".to_string(),
            (true, None) => "Signed in without a role".to_string(),
            (true, Some(role)) if self.user_name.trim().is_empty() => role.label().to_string(),
            (true, Some(role)) => format!("{} ({})", self.user_name.trim(), role.label()),
        }
    }
}
