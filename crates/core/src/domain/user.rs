use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Actor roles across the opportunity lifecycle.
///
/// Manager-level approvals are resolved through `reporting_manager`;
/// Director and BusinessHead approvals are resolved by role lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SalesExecutive,
    SalesManager,
    Director,
    BusinessHead,
    Delivery,
    Finance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalesExecutive => "sales_executive",
            Self::SalesManager => "sales_manager",
            Self::Director => "director",
            Self::BusinessHead => "business_head",
            Self::Delivery => "delivery",
            Self::Finance => "finance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sales_executive" => Some(Self::SalesExecutive),
            "sales_manager" => Some(Self::SalesManager),
            "director" => Some(Self::Director),
            "business_head" => Some(Self::BusinessHead),
            "delivery" => Some(Self::Delivery),
            "finance" => Some(Self::Finance),
            _ => None,
        }
    }

    /// Roles allowed to trigger escalation on opportunities they do not own.
    pub fn may_escalate_any(&self) -> bool {
        matches!(self, Self::SalesManager | Self::BusinessHead)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub reporting_manager: Option<UserId>,
    /// Two-letter code embedded in opportunity numbers created by this user.
    pub creator_code: String,
    /// Opaque bearer credential; issuance is owned by the auth collaborator.
    pub api_token: Option<String>,
    /// Performance-dashboard payload, opaque to the workflow engine.
    pub targets: Option<serde_json::Value>,
}
