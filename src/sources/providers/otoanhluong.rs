use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::ScraperConfig;
use crate::models::Listing;
use crate::sources::http::HttpFetcher;
use crate::sources::traits::ListingSource;
use crate::utils::brand::infer_brand;
use crate::utils::json::{as_i64, as_text};
use crate::utils::text::{absolute_url, clean_text};

pub const SOURCE_ID: &str = "otoanhluong";
pub const SOURCE_NAME: &str = "Anh Lượng Auto";
const BASE_URL: &str = "https://otoanhluong.vn/";
const LOAD_MORE_PATH: &str = "ajax/ajaxLoadMoreCars.php";
const MAX_LOAD_MORE: u32 = 50;
const UPFRONT_LABEL: &str = "Trả trước";

static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector '{}': {:?}", css, e))
}

/// Attribute label for the Font Awesome icon in front of a spec line.
fn icon_label(class: &str) -> &'static str {
    match class {
        "fa-calendar-alt" => "Năm sản xuất",
        "fa-tachometer-alt" => "ODO",
        "fa-gas-pump" => "Nhiên liệu",
        "fa-car" => "Kiểu dáng",
        _ => "Thông tin",
    }
}

fn text_of(element: ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Text of `element` without its `<i>` icon children.
fn text_without_icons(element: ElementRef) -> String {
    let text: String = element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.text.to_string()),
            Node::Element(e) if e.name() != "i" => ElementRef::wrap(child).map(|el| el.text().collect()),
            _ => None,
        })
        .collect();
    clean_text(&text)
}

fn path_slug(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().trim_start_matches('/').to_string())
        .unwrap_or_default()
}

pub struct HomePage {
    pub cars: Vec<Listing>,
    /// Stock size announced by the page, when present.
    pub total: Option<usize>,
}

pub fn parse_home_page(html: &str, base: &Url) -> Result<HomePage> {
    let document = Html::parse_document(html);
    let items = sel("ul.al-list-cars li.al-item")?;
    let anchor_sel = sel(".car-home-tieu-de a.al-car")?;
    let img_sel = sel(".car-home img.al-img-car")?;
    let price_sel = sel(".al-box-price .al-price")?;
    let upfront_sel = sel(".al-box-price .tra-truoc-al")?;
    let info_sel = sel(".al-info-car li")?;
    let icon_sel = sel("i")?;

    let mut cars = Vec::new();
    for (index, item) in document.select(&items).enumerate() {
        let Some(anchor) = item.select(&anchor_sel).next() else {
            continue;
        };
        let title = text_of(anchor);
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if title.is_empty() || href.is_empty() {
            continue;
        }

        let url = absolute_url(base, href);
        let slug = path_slug(&url);
        let local_id = if slug.is_empty() { index.to_string() } else { slug.clone() };

        let brand = infer_brand(&[slug.as_str(), title.as_str()]);
        let mut listing = Listing::new(SOURCE_ID, SOURCE_NAME, local_id, title);
        listing.url = Some(url);
        listing.thumbnail = item
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| absolute_url(base, src))
            .unwrap_or_default();
        listing.price_text = item.select(&price_sel).next().map(text_of).unwrap_or_default();
        listing.brand = brand.brand;
        listing.brand_slug = brand.slug;

        if let Some(upfront) = item.select(&upfront_sel).next() {
            listing.push_attribute(UPFRONT_LABEL, clean_text(&text_of(upfront).replace(UPFRONT_LABEL, "")));
        }
        for info in item.select(&info_sel) {
            let label = info
                .select(&icon_sel)
                .next()
                .and_then(|icon| icon.value().classes().find(|c| c.starts_with("fa-")))
                .map(icon_label)
                .unwrap_or("Thông tin");
            listing.push_attribute(label, text_without_icons(info));
        }

        cars.push(listing);
    }

    let total = sel("#al-car-all span")?;
    let total = document
        .select(&total)
        .next()
        .map(text_of)
        .and_then(|text| FIRST_NUMBER.find(&text).and_then(|m| m.as_str().parse().ok()));

    Ok(HomePage { cars, total })
}

/// Reply of the "load more" endpoint behind the home page grid.
#[derive(Debug, Default, Deserialize)]
pub struct LoadMoreResponse {
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<Value>,
    #[serde(rename = "listCars", default)]
    pub list_cars: Option<Vec<LoadMoreCar>>,
    #[serde(default)]
    pub btn_status: Option<Value>,
    #[serde(default)]
    pub page: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadMoreCar {
    pub title: Option<Value>,
    pub title_car: Option<Value>,
    pub url: Option<Value>,
    pub botvn_car_id: Option<Value>,
    #[serde(rename = "_make_name")]
    pub make_name: Option<Value>,
    #[serde(rename = "_image")]
    pub resized_image: Option<Value>,
    pub image: Option<Value>,
    pub price: Option<Value>,
    pub prepay: Option<Value>,
    pub car_year: Option<Value>,
    pub mileage: Option<Value>,
    pub fueltype_id: Option<Value>,
    pub body_style_id: Option<Value>,
}

impl LoadMoreResponse {
    pub fn is_error(&self) -> bool {
        as_i64(&self.error_code).is_some_and(|code| code != 0)
    }

    pub fn cars(&self) -> &[LoadMoreCar] {
        self.list_cars.as_deref().unwrap_or_default()
    }

    /// The server reports there is nothing left to load.
    pub fn is_exhausted(&self) -> bool {
        as_i64(&self.btn_status) == Some(0)
    }

    /// Page to request after `current`; `None` when the reply does not move on.
    pub fn next_page(&self, current: u32) -> Option<u32> {
        as_i64(&self.page)
            .and_then(|page| u32::try_from(page).ok())
            .filter(|page| *page > 0 && *page != current)
    }
}

impl LoadMoreCar {
    pub fn to_listing(&self, base: &Url) -> Option<Listing> {
        let title = as_text(&self.title)
            .or_else(|| as_text(&self.title_car))
            .map(|t| clean_text(&t))
            .filter(|t| !t.is_empty())?;
        let slug = as_text(&self.url)
            .or_else(|| as_text(&self.botvn_car_id))
            .unwrap_or_else(|| title.clone());
        let local_id = as_text(&self.botvn_car_id).unwrap_or_else(|| slug.clone());

        let make = as_text(&self.make_name).unwrap_or_default();
        let brand = infer_brand(&[make.as_str(), slug.as_str(), title.as_str()]);
        let mut listing = Listing::new(SOURCE_ID, SOURCE_NAME, local_id, title);
        listing.url = Some(absolute_url(base, &format!("Xe-{}", slug)));
        listing.thumbnail = as_text(&self.resized_image)
            .or_else(|| as_text(&self.image))
            .map(|src| absolute_url(base, &src))
            .unwrap_or_default();
        listing.price_text = as_text(&self.price).unwrap_or_default();
        listing.brand = brand.brand;
        listing.brand_slug = brand.slug;

        for (label, value) in [
            (UPFRONT_LABEL, &self.prepay),
            ("Năm sản xuất", &self.car_year),
            ("ODO", &self.mileage),
            ("Nhiên liệu", &self.fueltype_id),
            ("Kiểu dáng", &self.body_style_id),
        ] {
            listing.push_attribute(label, as_text(value).unwrap_or_default());
        }

        Some(listing)
    }
}

/// Stock of the Anh Lượng dealership: the home page grid plus every batch
/// behind its "load more" button.
pub struct OtoAnhLuongSource {
    base_url: Url,
    http: HttpFetcher,
}

impl OtoAnhLuongSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Self::with_base_url(config, Url::parse(BASE_URL)?)
    }

    pub fn with_base_url(config: &ScraperConfig, base_url: Url) -> Result<Self> {
        Ok(Self {
            base_url,
            http: HttpFetcher::new(config, "Anh Lượng")?,
        })
    }

    async fn load_more(&self, endpoint: &Url, page: u32) -> Result<LoadMoreResponse> {
        let page = page.to_string();
        self.http
            .post_form_json(
                endpoint.as_str(),
                &[("page", page.as_str()), ("make_id", "0"), ("sort", ""), ("action", "2")],
            )
            .await
    }
}

#[async_trait]
impl ListingSource for OtoAnhLuongSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let html = self.http.get_text(self.base_url.as_str()).await?;
        let home = parse_home_page(&html, &self.base_url)?;
        tracing::debug!(source = SOURCE_ID, cars = home.cars.len(), total = ?home.total, "Fetched home page");

        let mut seen = HashSet::new();
        let mut cars: Vec<Listing> = home
            .cars
            .into_iter()
            .filter(|car| seen.insert(car.id.clone()))
            .collect();

        let endpoint = self.base_url.join(LOAD_MORE_PATH)?;
        let mut page = 1;
        for _ in 0..MAX_LOAD_MORE {
            if home.total.is_some_and(|total| cars.len() >= total) {
                break;
            }

            let batch = self.load_more(&endpoint, page).await?;
            if batch.is_error() {
                tracing::warn!(source = SOURCE_ID, page, code = ?batch.error_code, "Load more returned an error code");
                break;
            }
            let fresh = batch
                .cars()
                .iter()
                .filter_map(|car| car.to_listing(&self.base_url))
                .filter(|car| seen.insert(car.id.clone()));
            cars.extend(fresh);

            if batch.cars().is_empty() || batch.is_exhausted() {
                break;
            }
            match batch.next_page(page) {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(cars)
    }
}
