use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPerson {
    pub name: String,
    pub designation: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Company record referenced by opportunities, never owned by them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub company_name: String,
    pub sector: Option<String>,
    pub contact_persons: Vec<ContactPerson>,
}
