//! Authorization gate: decides which caller may act at all, and whether a
//! listing shows every client or only the caller's own.

use std::collections::HashMap;

use crate::config::AdminsConfig;

/// Listing scope for an authorized caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Superadmin: every client, grouped by owner.
    All,
    /// Regular admin: only clients the caller created.
    OwnedOnly,
}

/// Immutable admin roster built once at startup. No runtime mutation.
#[derive(Debug, Clone)]
pub struct AdminRoster {
    superadmin_id: i64,
    names: HashMap<i64, String>,
}

impl AdminRoster {
    pub fn from_config(admins: &AdminsConfig) -> Self {
        let mut names = HashMap::new();
        names.insert(admins.superadmin_id, admins.superadmin_name.clone());
        for (id, name) in admins.admin_ids.iter().zip(admins.admin_names.iter()) {
            names.insert(*id, name.trim().to_string());
        }
        Self {
            superadmin_id: admins.superadmin_id,
            names,
        }
    }

    /// True iff the caller is the superadmin or a configured admin.
    pub fn is_authorized(&self, caller_id: i64) -> bool {
        self.names.contains_key(&caller_id)
    }

    pub fn visibility(&self, caller_id: i64) -> Visibility {
        if caller_id == self.superadmin_id {
            Visibility::All
        } else {
            Visibility::OwnedOnly
        }
    }

    pub fn display_name(&self, admin_id: i64) -> Option<&str> {
        self.names.get(&admin_id).map(String::as_str)
    }

    pub fn superadmin_id(&self) -> i64 {
        self.superadmin_id
    }
}
