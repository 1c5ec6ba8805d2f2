use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

use crate::config::ScraperConfig;
use crate::models::{Attribute, Contact, DetailRecord, DetailSection, Listing};
use crate::sources::http::HttpFetcher;
use crate::sources::traits::{DetailSource, ListingSource, ProviderProfile};
use crate::utils::brand::infer_brand;
use crate::utils::json::{as_i64, as_text};
use crate::utils::text::{clean_text, slugify};

pub const SOURCE_ID: &str = "chotot";
pub const SOURCE_NAME: &str = "Chợ Tốt (Buôn Ma Thuột)";
const API_BASE_URL: &str = "https://gateway.chotot.com/v1/public/ad-listing";
const SITE_URL: &str = "https://xe.chotot.com";

// Buôn Ma Thuột, 10 km radius
const LATITUDE: f64 = 12.6796827;
const LONGITUDE: f64 = 108.0447368;
const DISTANCE_KM: u32 = 10;
const PAGE_LIMIT: u32 = 100;

const CAR_CATEGORIES: [i64; 3] = [2010, 2020, 2030];
const MIN_CAR_PRICE: i64 = 50_000_000;
const EXCLUDED_KEYWORDS: &[&str] = &[
    "xe máy", "xe may", "mô tô", "mo to", "môtô", "moto", "xe đạp", "xe dap", "scooter",
    "exciter", "winner", "wave", "sirius", "jupiter", "vision", "air blade", "airblade", "sh ",
    "lead", "vario", "pcx", "nvx", "grande", "janus", "freego", "vespa", "piaggio", "r15",
    "mt-15", "mt15", "cbr150", "cb150", "raider", "satria", "sonic", "future", "dream", "cub",
    "xe tải", "xe tai", "xe ben", "xe bồn", "xe bon", "xe cẩu", "xe cau", "xe nâng", "xe nang",
    "xe đầu kéo", "xe dau keo", "máy nông nghiệp",
];

static LISTING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-i(\d+)(?:\.htm)?$").unwrap());

/// One ad as returned by the Chợ Tốt gateway. Numeric fields are kept as
/// raw JSON values because the API is inconsistent about quoting them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChototAd {
    pub list_id: Option<Value>,
    pub ad_id: Option<Value>,
    pub subject: Option<String>,
    pub title: Option<String>,
    pub price: Option<Value>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub images: Vec<Value>,
    pub category: Option<Value>,
    pub car_year: Option<Value>,
    pub mileage_v2: Option<Value>,
    pub mileage: Option<Value>,
    pub gearbox: Option<Value>,
    pub fuel: Option<Value>,
    pub number_of_seat: Option<Value>,
    pub origin: Option<Value>,
    pub body_type: Option<Value>,
    pub body_type_name: Option<String>,
    pub drivetrain: Option<Value>,
    pub engine: Option<Value>,
    pub exterior_color: Option<String>,
    pub brand_name: Option<String>,
    pub model_name: Option<String>,
    pub area_name: Option<String>,
    pub region_name: Option<String>,
    pub account_name: Option<String>,
    pub phone: Option<String>,
    pub phone_hidden: Option<String>,
    pub body: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListingResponse {
    ads: Vec<ChototAd>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailResponse {
    Wrapped { ad: ChototAd },
    Bare(ChototAd),
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Formats an integer with `.` thousands separators, as vi-VN does.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn format_price(price: i64) -> String {
    if price <= 0 {
        return "Thỏa thuận".to_string();
    }
    if price >= 1_000_000_000 {
        let billions = price as f64 / 1_000_000_000.0;
        return if price % 1_000_000_000 == 0 {
            format!("{:.0} tỷ", billions)
        } else {
            format!("{:.1} tỷ", billions)
        };
    }
    if price >= 1_000_000 {
        return format!("{:.0} triệu", price as f64 / 1_000_000.0);
    }
    format!("{} đ", group_thousands(price))
}

fn gearbox_text(code: &Option<Value>) -> Option<String> {
    as_i64(code).map(|c| match c {
        1 => "Số sàn".to_string(),
        2 => "Số tự động".to_string(),
        other => other.to_string(),
    })
}

fn fuel_text(code: &Option<Value>) -> Option<String> {
    as_i64(code).map(|c| match c {
        1 => "Xăng".to_string(),
        2 => "Dầu".to_string(),
        3 => "Hybrid".to_string(),
        4 => "Điện".to_string(),
        other => other.to_string(),
    })
}

fn origin_text(code: &Option<Value>) -> Option<String> {
    as_i64(code).map(|c| match c {
        1 => "Trong nước".to_string(),
        2 => "Nhập khẩu".to_string(),
        other => other.to_string(),
    })
}

fn drivetrain_text(code: &Option<Value>) -> Option<String> {
    as_i64(code).map(|c| match c {
        1 => "Cầu trước (FWD)".to_string(),
        2 => "Cầu sau (RWD)".to_string(),
        3 => "4 cầu (4WD/AWD)".to_string(),
        other => other.to_string(),
    })
}

impl ChototAd {
    fn listing_id(&self) -> Option<String> {
        as_text(&self.list_id).or_else(|| as_text(&self.ad_id))
    }

    fn subject(&self) -> &str {
        non_blank(&self.subject)
            .or_else(|| non_blank(&self.title))
            .unwrap_or_default()
    }

    fn price(&self) -> i64 {
        as_i64(&self.price).unwrap_or(0)
    }

    fn mileage_text(&self) -> Option<String> {
        as_i64(&self.mileage_v2)
            .filter(|km| *km != 0)
            .or_else(|| as_i64(&self.mileage).filter(|km| *km != 0))
            .map(|km| format!("{} km", group_thousands(km)))
    }

    fn seats_text(&self) -> Option<String> {
        as_text(&self.number_of_seat)
            .filter(|s| s != "0")
            .map(|s| format!("{} chỗ", s))
    }

    fn location(&self) -> Option<String> {
        let parts: Vec<&str> = [non_blank(&self.area_name), non_blank(&self.region_name)]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() { None } else { Some(parts.join(", ")) }
    }

    /// Heuristic filter: the car category still carries motorbikes and trucks.
    pub fn is_car(&self) -> bool {
        if let Some(category) = as_i64(&self.category) {
            if !CAR_CATEGORIES.contains(&category)
                && self.car_year.is_none()
                && self.number_of_seat.is_none()
                && self.gearbox.is_none()
            {
                return false;
            }
        }

        let title = self.subject().to_lowercase();
        if EXCLUDED_KEYWORDS.iter().any(|k| title.contains(k)) {
            return false;
        }

        let price = self.price();
        !(price > 0 && price < MIN_CAR_PRICE)
    }
}

pub fn listing_url(listing_id: &str, subject: &str) -> String {
    format!("{}/{}-i{}", SITE_URL, slugify(subject), listing_id)
}

pub fn parse_ad(ad: &ChototAd) -> Option<Listing> {
    let listing_id = ad.listing_id()?;
    let subject = ad.subject();

    let mut listing = Listing::new(SOURCE_ID, SOURCE_NAME, &listing_id, clean_text(subject));
    listing.price_text = format_price(ad.price());
    listing.thumbnail = non_blank(&ad.image)
        .or_else(|| non_blank(&ad.thumbnail))
        .unwrap_or_default()
        .to_string();
    listing.url = Some(listing_url(&listing_id, subject));

    if let Some(year) = as_text(&ad.car_year) {
        listing.push_attribute("Năm sản xuất", year);
    }
    if let Some(km) = ad.mileage_text() {
        listing.push_attribute("Số km đã đi", km);
    }
    if let Some(gearbox) = gearbox_text(&ad.gearbox) {
        listing.push_attribute("Hộp số", gearbox);
    }
    if let Some(fuel) = fuel_text(&ad.fuel) {
        listing.push_attribute("Nhiên liệu", fuel);
    }
    if let Some(seats) = ad.seats_text() {
        listing.push_attribute("Số chỗ ngồi", seats);
    }
    if let Some(origin) = origin_text(&ad.origin) {
        listing.push_attribute("Xuất xứ", origin);
    }
    if ad.body_type.is_some() {
        let body = non_blank(&ad.body_type_name)
            .map(str::to_string)
            .or_else(|| as_text(&ad.body_type));
        listing.push_attribute("Kiểu dáng", body.unwrap_or_default());
    }
    if let Some(location) = ad.location() {
        listing.push_attribute("Khu vực", location);
    }

    let brand = infer_brand(&[
        subject,
        ad.brand_name.as_deref().unwrap_or_default(),
        ad.model_name.as_deref().unwrap_or_default(),
    ]);
    listing.brand = if brand.brand.is_empty() {
        non_blank(&ad.brand_name).unwrap_or_default().to_string()
    } else {
        brand.brand
    };
    listing.brand_slug = brand.slug;

    Some(listing)
}

pub fn parse_listing_response(body: &str) -> Result<Vec<Listing>> {
    let response: ListingResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Chợ Tốt returned malformed listing JSON: {}", e))?;
    Ok(response
        .ads
        .iter()
        .filter(|ad| ad.is_car())
        .filter_map(parse_ad)
        .collect())
}

pub fn parse_detail_response(body: &str) -> Result<DetailRecord> {
    let ad = match serde_json::from_str::<DetailResponse>(body)
        .map_err(|e| anyhow!("Chợ Tốt returned malformed detail JSON: {}", e))?
    {
        DetailResponse::Wrapped { ad } => ad,
        DetailResponse::Bare(ad) => ad,
    };
    let listing_id = ad
        .listing_id()
        .ok_or_else(|| anyhow!("Chợ Tốt detail response has no listing id"))?;
    let subject = ad.subject();

    let mut record = DetailRecord::new(SOURCE_ID, SOURCE_NAME, listing_url(&listing_id, subject));
    record.title = clean_text(subject);
    record.price_text = format_price(ad.price());

    let year = as_text(&ad.car_year);
    let brand = non_blank(&ad.brand_name).map(str::to_string);
    let model = non_blank(&ad.model_name).map(str::to_string);
    let mileage = ad.mileage_text();
    let gearbox = gearbox_text(&ad.gearbox);
    let fuel = fuel_text(&ad.fuel);
    let seats = ad.seats_text();

    let push = |items: &mut Vec<Attribute>, label: &str, value: &Option<String>| {
        if let Some(value) = value {
            items.push(Attribute::new(label, value.clone()));
        }
    };

    push(&mut record.summary, "Năm sản xuất", &year);
    push(&mut record.summary, "Hãng xe", &brand);
    push(&mut record.summary, "Dòng xe", &model);
    push(&mut record.summary, "Số km đã đi", &mileage);
    push(&mut record.summary, "Hộp số", &gearbox);
    push(&mut record.summary, "Nhiên liệu", &fuel);
    push(&mut record.summary, "Số chỗ ngồi", &seats);
    push(&mut record.summary, "Xuất xứ", &origin_text(&ad.origin));

    let mut vehicle = Vec::new();
    push(&mut vehicle, "Hãng xe", &brand);
    push(&mut vehicle, "Dòng xe", &model);
    push(&mut vehicle, "Năm sản xuất", &year);
    push(&mut vehicle, "Kiểu dáng", &non_blank(&ad.body_type_name).map(str::to_string));
    push(&mut vehicle, "Màu ngoại thất", &non_blank(&ad.exterior_color).map(str::to_string));
    if !vehicle.is_empty() {
        record.sections.push(DetailSection {
            title: "Thông tin xe".to_string(),
            items: vehicle,
        });
    }

    let mut specs = Vec::new();
    push(&mut specs, "Dung tích động cơ", &as_text(&ad.engine));
    push(&mut specs, "Số km đã đi", &mileage);
    push(&mut specs, "Hộp số", &gearbox);
    push(&mut specs, "Nhiên liệu", &fuel);
    push(&mut specs, "Số chỗ ngồi", &seats);
    push(&mut specs, "Dẫn động", &drivetrain_text(&ad.drivetrain));
    if !specs.is_empty() {
        record.sections.push(DetailSection {
            title: "Thông số kỹ thuật".to_string(),
            items: specs,
        });
    }

    record.gallery = ad
        .images
        .iter()
        .filter_map(|image| match image {
            Value::String(url) => Some(url.clone()),
            Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect();
    if record.gallery.is_empty() {
        if let Some(image) = non_blank(&ad.image) {
            record.gallery.push(image.to_string());
        }
    }

    let phone = non_blank(&ad.phone).map(str::to_string);
    record.contact = Contact {
        dealer: non_blank(&ad.account_name).map(str::to_string),
        phone: phone.clone().or_else(|| non_blank(&ad.phone_hidden).map(str::to_string)),
        hotline_link: phone
            .as_deref()
            .map(|p| format!("tel:{}", p.split_whitespace().collect::<String>())),
        hotline: phone,
        address: ad.location(),
        chat: None,
    };
    record.description = non_blank(&ad.body)
        .or_else(|| non_blank(&ad.description))
        .unwrap_or_default()
        .to_string();

    Ok(record)
}

pub fn extract_listing_id(url: &Url) -> Option<String> {
    LISTING_ID
        .captures(url.path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Chợ Tốt car ads around Buôn Ma Thuột, read from the public JSON gateway.
pub struct ChototSource {
    profile: ProviderProfile,
    http: HttpFetcher,
    api_base: String,
}

impl ChototSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Self::with_api_base(config, API_BASE_URL)
    }

    pub fn with_api_base(config: &ScraperConfig, api_base: &str) -> Result<Self> {
        Ok(Self {
            profile: ProviderProfile::new(
                SOURCE_ID,
                SOURCE_NAME,
                Url::parse(SITE_URL)?,
                &["xe.chotot.com", "www.chotot.com", "chotot.com"],
            ),
            http: HttpFetcher::new(config, "Chợ Tốt API")?,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn list_url(&self) -> String {
        format!(
            "{}?cg=2010&latitude={}&longitude={}&distance={}&limit={}&o=0&st=s,k&f=p&key_param_included=true",
            self.api_base, LATITUDE, LONGITUDE, DISTANCE_KM, PAGE_LIMIT
        )
    }
}

#[async_trait]
impl ListingSource for ChototSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let body = self.http.get_text(&self.list_url()).await?;
        parse_listing_response(&body)
    }
}

#[async_trait]
impl DetailSource for ChototSource {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn fetch_detail(&self, url: &Url) -> Result<DetailRecord> {
        let listing_id = extract_listing_id(url)
            .ok_or_else(|| anyhow!("Could not find a Chợ Tốt listing id in {}", url))?;
        let body = self
            .http
            .get_text(&format!("{}/{}", self.api_base, listing_id))
            .await?;
        parse_detail_response(&body)
    }
}
