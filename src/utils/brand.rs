//! Best-effort vehicle brand detection from free-form listing text.

use std::sync::LazyLock;

const BRANDS: &[(&str, &[&str])] = &[
    ("Audi", &["audi"]),
    ("BMW", &["bmw"]),
    ("Chevrolet", &["chevrolet", "chevy"]),
    ("Dongfeng", &["dongfeng"]),
    ("Ford", &["ford"]),
    ("Hino", &["hino"]),
    ("Honda", &["honda"]),
    ("Hyundai", &["hyundai", "huynhdai", "huyndai"]),
    ("Isuzu", &["isuzu"]),
    ("Kia", &["kia"]),
    ("Land Rover", &["land rover", "landrover"]),
    ("Lexus", &["lexus"]),
    ("Mazda", &["mazda"]),
    ("Mercedes-Benz", &["mercedes benz", "mercedes-benz", "mercedes"]),
    ("Mitsubishi", &["mitsubishi"]),
    ("Nissan", &["nissan"]),
    ("Peugeot", &["peugeot"]),
    ("Porsche", &["porsche"]),
    ("Subaru", &["subaru"]),
    ("Suzuki", &["suzuki"]),
    ("Toyota", &["toyota"]),
    ("VinFast", &["vinfast"]),
    ("Volkswagen", &["volkswagen", "vw"]),
    ("Volvo", &["volvo"]),
];

// (normalized keyword, brand name), in table order
static KEYWORDS: LazyLock<Vec<(String, &'static str)>> = LazyLock::new(|| {
    BRANDS
        .iter()
        .flat_map(|(name, keywords)| keywords.iter().map(move |k| (normalize(k), *name)))
        .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandInfo {
    pub brand: String,
    pub slug: String,
}

fn normalize(value: &str) -> String {
    let lowered: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn brand_slug(name: &str) -> String {
    normalize(name).replace(' ', "-")
}

fn detect(value: &str) -> Option<&'static str> {
    let normalized = normalize(value);
    if normalized.is_empty() {
        return None;
    }
    let padded = format!(" {} ", normalized);
    KEYWORDS
        .iter()
        .find(|(keyword, _)| padded.contains(&format!(" {} ", keyword)))
        .map(|(_, name)| *name)
}

/// Returns the first brand found across `candidates`, tried in order.
pub fn infer_brand<S: AsRef<str>>(candidates: &[S]) -> BrandInfo {
    candidates
        .iter()
        .find_map(|c| detect(c.as_ref()))
        .map(|name| BrandInfo {
            brand: name.to_string(),
            slug: brand_slug(name),
        })
        .unwrap_or_default()
}
