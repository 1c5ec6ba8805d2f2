use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Attribute;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailSection {
    pub title: String,
    pub items: Vec<Attribute>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotline_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
}

/// Rich single-listing data fetched on demand and cached per `(source, url)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub source: String,
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub price_text: String,
    pub summary: Vec<Attribute>,
    pub sections: Vec<DetailSection>,
    pub description: String,
    pub gallery: Vec<String>,
    pub contact: Contact,
    pub scraped_at: DateTime<Utc>,
}

impl DetailRecord {
    pub fn new(source: &str, source_name: &str, url: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            source_name: source_name.to_string(),
            url: url.into(),
            title: String::new(),
            price_text: String::new(),
            summary: Vec::new(),
            sections: Vec::new(),
            description: String::new(),
            gallery: Vec::new(),
            contact: Contact::default(),
            scraped_at: Utc::now(),
        }
    }
}

/// Maps an empty string to `None`.
pub fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.is_empty() { None } else { Some(value) }
}
