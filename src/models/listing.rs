use serde::{Deserialize, Serialize};

/// A free-form provider fact shown next to a listing, e.g. `Hộp số: Số tự động`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub label: String,
    pub value: String,
}

impl Attribute {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// One scraped vehicle listing.
///
/// `id` is prefixed with the source id and is unique within a snapshot. It is
/// not guaranteed to survive a refresh: some providers only expose positional
/// identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub source: String,
    pub source_name: String,
    pub title: String,
    #[serde(default)]
    pub price_text: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub brand_slug: String,
}

impl Listing {
    pub fn new(
        source: &str,
        source_name: &str,
        local_id: impl AsRef<str>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("{}-{}", source, local_id.as_ref()),
            source: source.to_string(),
            source_name: source_name.to_string(),
            title: title.into(),
            price_text: String::new(),
            thumbnail: String::new(),
            url: None,
            attributes: Vec::new(),
            brand: String::new(),
            brand_slug: String::new(),
        }
    }

    pub fn push_attribute(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.attributes.push(Attribute::new(label, value));
        }
    }
}
