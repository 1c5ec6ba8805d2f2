use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::ScraperConfig;
use crate::models::Listing;
use crate::sources::http::HttpFetcher;
use crate::sources::traits::ListingSource;
use crate::utils::brand::infer_brand;
use crate::utils::text::{absolute_url, clean_text};

pub const SOURCE_ID: &str = "xeluottoantrung";
pub const SOURCE_NAME: &str = "Xe Lướt Toàn Trung";
const BASE_URL: &str = "https://xeluottoantrung.com/";
const LIST_PATH: &str = "san-pham";
// guards against a pager that never ends
const MAX_PAGES: u32 = 50;

static PAGE_PARAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[?&]p=(\d+)").unwrap());

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector '{}': {:?}", css, e))
}

pub struct CatalogPage {
    pub cars: Vec<Listing>,
    pub total_pages: u32,
}

pub fn parse_catalog_page(html: &str, base: &Url) -> Result<CatalogPage> {
    let document = Html::parse_document(html);
    let items = sel(".wap_item > .item")?;
    let anchor_sel = sel("h3.name_sp a")?;
    let img_sel = sel(".img_sp img")?;
    let price_sel = sel(".gia_sp b")?;
    let field_sel = sel(".mota ul li")?;
    let field_img_sel = sel("img")?;
    let id_sel = sel("p.id_ss")?;

    let mut cars = Vec::new();
    for (index, item) in document.select(&items).enumerate() {
        let Some(anchor) = item.select(&anchor_sel).next() else {
            continue;
        };
        let title = clean_text(&anchor.text().collect::<String>());
        if title.is_empty() {
            continue;
        }

        let href = anchor.value().attr("href").unwrap_or_default();
        let thumbnail = item
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("data-lazy").or_else(|| img.value().attr("src")))
            .map(|src| absolute_url(base, src))
            .unwrap_or_default();
        let price_text = item
            .select(&price_sel)
            .next()
            .map(|b| clean_text(&b.text().collect::<String>()))
            .unwrap_or_default();

        let local_id = item
            .select(&id_sel)
            .next()
            .and_then(|p| p.value().attr("data-id"))
            .filter(|id| !id.trim().is_empty())
            .map(|id| id.trim().to_string())
            .or_else(|| (!href.is_empty()).then(|| href.to_string()))
            .unwrap_or_else(|| index.to_string());

        let brand = infer_brand(&[href, title.as_str()]);
        let mut listing = Listing::new(SOURCE_ID, SOURCE_NAME, local_id, title);
        listing.price_text = price_text;
        listing.thumbnail = thumbnail;
        listing.url = Some(absolute_url(base, href)).filter(|u| !u.is_empty());
        listing.brand = brand.brand;
        listing.brand_slug = brand.slug;

        for field in item.select(&field_sel) {
            let label = field
                .select(&field_img_sel)
                .next()
                .and_then(|img| img.value().attr("alt"))
                .map(clean_text)
                .filter(|alt| !alt.is_empty())
                .unwrap_or_else(|| "Thông tin".to_string());
            listing.push_attribute(label, clean_text(&field.text().collect::<String>()));
        }

        cars.push(listing);
    }

    let pager = sel(".pagination-home .page-link")?;
    let mut total_pages = 1;
    for link in document.select(&pager) {
        if let Ok(number) = clean_text(&link.text().collect::<String>()).parse::<u32>() {
            total_pages = total_pages.max(number);
        }
        if let Some(number) = link
            .value()
            .attr("href")
            .and_then(|href| PAGE_PARAM.captures(href))
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            total_pages = total_pages.max(number);
        }
    }

    Ok(CatalogPage { cars, total_pages })
}

/// Paginated used-car catalogue of the Toàn Trung dealership.
pub struct XeLuotToanTrungSource {
    base_url: Url,
    http: HttpFetcher,
}

impl XeLuotToanTrungSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Self::with_base_url(config, Url::parse(BASE_URL)?)
    }

    pub fn with_base_url(config: &ScraperConfig, base_url: Url) -> Result<Self> {
        Ok(Self {
            base_url,
            http: HttpFetcher::new(config, "Toàn Trung")?,
        })
    }

    fn page_url(&self, page: u32) -> Result<Url> {
        let mut url = self.base_url.join(LIST_PATH)?;
        if page > 1 {
            url.query_pairs_mut().append_pair("p", &page.to_string());
        }
        Ok(url)
    }

    async fn fetch_page(&self, page: u32) -> Result<CatalogPage> {
        let url = self.page_url(page)?;
        let html = self.http.get_text(url.as_str()).await?;
        parse_catalog_page(&html, &self.base_url)
    }
}

#[async_trait]
impl ListingSource for XeLuotToanTrungSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let first = self.fetch_page(1).await?;
        let total_pages = first.total_pages.min(MAX_PAGES);
        tracing::debug!(source = SOURCE_ID, total_pages, "Fetched first catalogue page");

        let mut seen = HashSet::new();
        let mut cars: Vec<Listing> = first
            .cars
            .into_iter()
            .filter(|car| seen.insert(car.id.clone()))
            .collect();

        for page in 2..=total_pages {
            let next = self.fetch_page(page).await?;
            if next.cars.is_empty() {
                break;
            }
            cars.extend(next.cars.into_iter().filter(|car| seen.insert(car.id.clone())));
        }

        Ok(cars)
    }
}
