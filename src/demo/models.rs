// Demo models
// Also the input of the model collector when the console syncs the demo app

use serde::{Deserialize, Serialize};

/// A catalogue item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub api_token: String,
}
