//! Credential namespaces
//!
//! Every staff role signs in to its own slot in the key-value store, so a
//! pharmacist and a lab technician sharing one browser profile never read
//! each other's tokens. The mapping from namespace to storage keys is fixed
//! at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage key names for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageKeys {
    pub access: &'static str,
    pub refresh: &'static str,
}

/// Credential namespace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// General staff and patients.
    #[default]
    Staff,
    Finance,
    Lab,
    Pharmacy,
    Hr,
}

/// Role names per namespace, checked in order. First match wins.
const ROLE_TABLE: &[(Namespace, &[&str])] = &[
    (Namespace::Hr, &["ADMIN", "SUPER_ADMIN", "HR", "HR_MANAGER"]),
    (Namespace::Finance, &["CASHIER", "BILLING"]),
    (Namespace::Lab, &["LAB_TECHNICIAN", "LAB_TECH"]),
    (Namespace::Pharmacy, &["PHARMACIST"]),
];

impl Namespace {
    /// All namespaces, in role precedence order.
    pub const ALL: [Namespace; 5] = [
        Namespace::Hr,
        Namespace::Finance,
        Namespace::Lab,
        Namespace::Pharmacy,
        Namespace::Staff,
    ];

    /// The key pair this namespace is stored under.
    pub const fn keys(self) -> StorageKeys {
        match self {
            Namespace::Staff => StorageKeys {
                access: "accessToken",
                refresh: "refreshToken",
            },
            Namespace::Finance => StorageKeys {
                access: "financeAccessToken",
                refresh: "financeRefreshToken",
            },
            Namespace::Lab => StorageKeys {
                access: "labAccessToken",
                refresh: "labRefreshToken",
            },
            Namespace::Pharmacy => StorageKeys {
                access: "pharmacyAccessToken",
                refresh: "pharmacyRefreshToken",
            },
            Namespace::Hr => StorageKeys {
                access: "hrAccessToken",
                refresh: "hrRefreshToken",
            },
        }
    }

    /// Stable identifier used in events and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Namespace::Staff => "staff",
            Namespace::Finance => "finance",
            Namespace::Lab => "lab",
            Namespace::Pharmacy => "pharmacy",
            Namespace::Hr => "hr",
        }
    }

    /// Namespace for a single role name.
    ///
    /// Total: unknown, empty and patient roles all land in [`Namespace::Staff`].
    /// Matching ignores surrounding whitespace, ASCII case and a `ROLE_`
    /// prefix.
    ///
    /// ```
    /// use core_session::Namespace;
    ///
    /// assert_eq!(Namespace::resolve("PHARMACIST"), Namespace::Pharmacy);
    /// assert_eq!(Namespace::resolve("role_cashier"), Namespace::Finance);
    /// assert_eq!(Namespace::resolve("PATIENT"), Namespace::Staff);
    /// ```
    pub fn resolve(role: &str) -> Namespace {
        Self::for_roles([role])
    }

    /// Namespace for a set of roles, applying the same precedence as
    /// [`resolve`](Self::resolve) across all of them.
    pub fn for_roles<I, S>(roles: I) -> Namespace
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: Vec<String> = roles
            .into_iter()
            .map(|role| normalize_role(role.as_ref()))
            .collect();

        ROLE_TABLE
            .iter()
            .find(|(_, names)| {
                normalized
                    .iter()
                    .any(|role| names.iter().any(|name| role == name))
            })
            .map(|(namespace, _)| *namespace)
            .unwrap_or_default()
    }
}

fn normalize_role(role: &str) -> String {
    let upper = role.trim().to_ascii_uppercase();
    match upper.strip_prefix("ROLE_") {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown namespace: {}", s))
    }
}
