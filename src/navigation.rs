//! Role-specific dashboard navigation
//!
//! The role is resolved once from the profile into a [`Navigation`] value;
//! callers match on it instead of re-reading the role string.

use crate::types::{Profile, Role};
use crate::{Result, StkPayError};

/// A single navigation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

const fn item(label: &'static str, path: &'static str) -> NavItem {
    NavItem { label, path }
}

/// Pages available to a business account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessNav {
    pub name: String,
}

impl BusinessNav {
    pub const ITEMS: [NavItem; 6] = [
        item("Home", "/dashboard"),
        item("Send STK Push", "/dashboard/stk-push"),
        item("Transactions", "/dashboard/transactions"),
        item("Customers", "/dashboard/customers"),
        item("Wallet & Commissions", "/dashboard/wallet"),
        item("Settings", "/dashboard/settings"),
    ];
}

/// Pages available to an administrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNav {
    pub email: String,
}

impl AdminNav {
    pub const ITEMS: [NavItem; 4] = [
        item("Home", "/dashboard"),
        item("Businesses", "/dashboard/businesses"),
        item("Transactions", "/dashboard/transactions"),
        item("Commissions", "/dashboard/commissions"),
    ];
}

/// Navigation resolved for the logged-in account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Business(BusinessNav),
    Admin(AdminNav),
}

impl Navigation {
    /// Resolve navigation from a profile. Unknown roles are rejected.
    pub fn for_profile(profile: &Profile) -> Result<Self> {
        match profile.role {
            Role::Business => Ok(Self::Business(BusinessNav {
                name: profile.display_name().to_string(),
            })),
            Role::Admin => Ok(Self::Admin(AdminNav {
                email: profile.display_name().to_string(),
            })),
            Role::Unknown => Err(StkPayError::forbidden("Invalid role")),
        }
    }

    pub fn items(&self) -> &'static [NavItem] {
        match self {
            Self::Business(_) => &BusinessNav::ITEMS,
            Self::Admin(_) => &AdminNav::ITEMS,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Business(_) => Role::Business,
            Self::Admin(_) => Role::Admin,
        }
    }

    /// Whether a dashboard path is reachable for this role
    pub fn allows(&self, path: &str) -> bool {
        self.items().iter().any(|item| item.path == path)
    }
}
