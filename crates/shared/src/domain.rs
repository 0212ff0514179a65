use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ResourceId);
id_newtype!(Username);

/// The REST collections the client knows how to list, edit and view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Projects,
    Accounts,
    Invoices,
    Items,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Projects,
        ResourceKind::Accounts,
        ResourceKind::Invoices,
        ResourceKind::Items,
    ];

    /// Group and endpoint name under `collection.items` in the API root document.
    pub fn root_endpoint(self) -> (&'static str, &'static str) {
        match self {
            ResourceKind::Projects => ("projects", "projects"),
            ResourceKind::Accounts => ("accounts", "users"),
            ResourceKind::Invoices => ("invoices", "invoices"),
            ResourceKind::Items => ("invoices", "items"),
        }
    }

    /// First path segment of the client-side routes for this kind.
    pub fn route_segment(self) -> &'static str {
        match self {
            ResourceKind::Projects => "projects",
            ResourceKind::Accounts => "accounts",
            ResourceKind::Invoices => "invoices",
            ResourceKind::Items => "items",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            ResourceKind::Projects => "project",
            ResourceKind::Accounts => "account",
            ResourceKind::Invoices => "invoice",
            ResourceKind::Items => "item",
        }
    }

    pub fn from_route_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.route_segment() == segment)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route_segment())
    }
}

/// Field names the backend uses as the public identifier of a record, in
/// lookup order.
pub const IDENTITY_FIELDS: [&str; 3] = ["public_id", "id", "pk"];

/// Field names carrying the canonical URL of a record, in lookup order.
pub const HREF_FIELDS: [&str; 2] = ["href", "uri"];
