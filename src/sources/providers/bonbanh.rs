use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::ScraperConfig;
use crate::detail::pool::FetchPool;
use crate::models::{non_empty, Attribute, Contact, DetailRecord, DetailSection, Listing};
use crate::sources::http::HttpFetcher;
use crate::sources::traits::{DetailSource, ListingSource, ProviderProfile};
use crate::utils::brand::infer_brand;
use crate::utils::text::{absolute_url, clean_multiline, clean_text};

pub const SOURCE_ID: &str = "bonbanh";
pub const SOURCE_NAME: &str = "Bonbanh (Đắk Lắk)";
const BASE_URL: &str = "https://bonbanh.com/";
const SALON_LIST_PATH: &str = "salon-oto-xe-cu-dak-lak";
const SUMMARY_LIMIT: usize = 8;

static CAR_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)id,(\d+)").unwrap());
static DESCRIPTION_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mô tả|chi tiết").unwrap());

fn sel(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector '{}': {:?}", css, e))
}

fn text_of(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

fn first_text(scope: &ElementRef, css: &str) -> Result<String> {
    let selector = sel(css)?;
    Ok(scope.select(&selector).next().map(|e| text_of(&e)).unwrap_or_default())
}

fn first_attr(scope: &ElementRef, css: &str, attr: &str) -> Result<Option<String>> {
    let selector = sel(css)?;
    Ok(scope
        .select(&selector)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salon {
    pub slug: String,
    pub name: String,
    pub address: String,
    pub description: String,
    pub url: String,
}

pub fn parse_salon_list(html: &str, base: &Url) -> Result<Vec<Salon>> {
    let document = Html::parse_document(html);
    let anchors = sel(".salon_item a")?;
    let mut salons = Vec::new();

    for (index, anchor) in document.select(&anchors).enumerate() {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = absolute_url(base, href);
        let mut name = first_text(&anchor, ".sl_title")?;
        if name.is_empty() {
            name = clean_text(anchor.value().attr("title").unwrap_or_default());
        }
        let slug = Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.replace('.', "-")))
            .unwrap_or_else(|| format!("salon-{}", index));

        salons.push(Salon {
            slug,
            name,
            address: first_text(&anchor, ".s_i2")?,
            description: first_text(&anchor, ".s_spec")?,
            url,
        });
    }

    Ok(salons)
}

pub fn parse_salon_cars(html: &str, salon: &Salon, base: &Url) -> Result<Vec<Listing>> {
    let document = Html::parse_document(html);
    let items = sel("#main_products li")?;
    let mut cars = Vec::new();

    for (index, item) in document.select(&items).enumerate() {
        let title = first_text(&item, ".item_title b")?;
        let Some(link) = first_attr(&item, ".item_title a", "href")? else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let url = absolute_url(base, &link);
        let price = first_text(&item, ".item_price b")?;
        let price_text = price
            .strip_prefix("Giá:")
            .map(str::trim_start)
            .unwrap_or(&price)
            .to_string();
        let description = first_text(&item, ".item_description")?;
        let thumbnail = first_attr(&item, ".item_img img", "src")?
            .map(|src| absolute_url(base, &src))
            .unwrap_or_default();
        let tooltip = {
            let selector = sel(".div_tip")?;
            item.select(&selector)
                .next()
                .map(|e| clean_multiline(&e.text().collect::<String>()))
                .unwrap_or_default()
        };

        // positional fallback: such ids do not survive a refresh
        let local_id = CAR_ID
            .captures(&url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| format!("{}-{}", salon.slug, index));

        let source_name = if salon.name.is_empty() {
            SOURCE_NAME.to_string()
        } else {
            format!("{} - {}", SOURCE_NAME, salon.name)
        };

        let brand = infer_brand(&[title.as_str(), url.as_str(), salon.name.as_str()]);

        let mut listing = Listing::new(SOURCE_ID, &source_name, local_id, title);
        listing.price_text = price_text;
        listing.thumbnail = thumbnail;
        listing.url = Some(url);
        listing.push_attribute("Salon", salon.name.clone());
        listing.push_attribute("Địa chỉ", salon.address.clone());
        listing.push_attribute("Tổng quan", description);
        listing.push_attribute("Thông tin thêm", tooltip);
        listing.brand = brand.brand;
        listing.brand_slug = brand.slug;
        cars.push(listing);
    }

    Ok(cars)
}

fn collect_box_items(box_el: &ElementRef) -> Result<Vec<Attribute>> {
    let rows = sel(".tab_left_item, .tab_right_item")?;
    let spans = sel("span")?;
    let checkbox = sel("input[type=\"checkbox\"]")?;
    let mut items = Vec::new();

    for row in box_el.select(&rows) {
        let row_spans: Vec<ElementRef> = row.select(&spans).collect();
        let (Some(first), Some(last)) = (row_spans.first(), row_spans.last()) else {
            continue;
        };
        let label = text_of(first).trim_end_matches(':').trim().to_string();
        let mut value = text_of(last);
        if value.is_empty() {
            if let Some(input) = last.select(&checkbox).next() {
                if input.value().attr("checked").is_some() {
                    value = "Có".to_string();
                }
            }
        }
        if !label.is_empty() && !value.is_empty() {
            items.push(Attribute::new(label, value));
        }
    }

    Ok(items)
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn extract_tab_sections(pane: &ElementRef) -> Result<Vec<DetailSection>> {
    let titles = sel(".tab_title")?;
    let mut sections = Vec::new();

    for title_node in pane.select(&titles) {
        let title = text_of(&title_node);
        let Some(box_el) = title_node.next_siblings().find_map(ElementRef::wrap) else {
            continue;
        };

        if has_class(&box_el, "tab_bottom_box") {
            let text = clean_multiline(&box_el.text().collect::<String>());
            if !text.is_empty() {
                sections.push(DetailSection {
                    title: if title.is_empty() { "Thông tin mô tả".to_string() } else { title },
                    items: vec![Attribute::new("Chi tiết", text)],
                });
            }
            continue;
        }

        if !has_class(&box_el, "tab_left_box") && !has_class(&box_el, "tab_right_box") {
            continue;
        }

        let items = collect_box_items(&box_el)?;
        if !items.is_empty() {
            sections.push(DetailSection {
                title: if title.is_empty() { "Thông tin".to_string() } else { title },
                items,
            });
        }
    }

    Ok(sections)
}

fn extract_gallery(document: &Html, base: &Url) -> Result<Vec<String>> {
    let nodes = sel("#detail_list_img_left a, #detail_list_img_right img, #detail_list_img_right a")?;
    let mut seen = HashSet::new();
    let mut gallery = Vec::new();

    for node in document.select(&nodes) {
        let raw = node
            .value()
            .attr("href")
            .or_else(|| node.value().attr("src"))
            .unwrap_or_default();
        let url = absolute_url(base, raw);
        if !url.is_empty() && seen.insert(url.clone()) {
            gallery.push(url);
        }
    }

    Ok(gallery)
}

pub fn parse_detail(html: &str, url: &Url, base: &Url) -> Result<DetailRecord> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut record = DetailRecord::new(SOURCE_ID, SOURCE_NAME, url.as_str());
    record.title = first_text(&root, "#detail_title p")?;
    record.price_text = first_text(&root, ".price_list_car b")?;

    let panes = sel("#detail_tabber .tab-pane")?;
    for (index, pane) in document.select(&panes).enumerate() {
        let pane_sections = extract_tab_sections(&pane)?;
        if pane_sections.is_empty() {
            continue;
        }
        if index == 0 {
            record.summary.extend(
                pane_sections
                    .iter()
                    .flat_map(|s| s.items.iter().cloned())
                    .take(SUMMARY_LIMIT),
            );
        }
        for section in pane_sections {
            if record.description.is_empty() && DESCRIPTION_TITLE.is_match(&section.title) {
                if let Some(first) = section.items.first() {
                    record.description = first.value.clone();
                }
            }
            record.sections.push(section);
        }
    }

    let fallback = {
        let selector = sel("#item_description, .item_description")?;
        document
            .select(&selector)
            .next()
            .map(|e| clean_multiline(&e.text().collect::<String>()))
            .unwrap_or_default()
    };
    if record.summary.is_empty() && !fallback.is_empty() {
        record.summary.push(Attribute::new("Mô tả", fallback.clone()));
    }
    if record.description.is_empty() {
        record.description = fallback;
    }

    let address = first_text(&root, "#item_address")?;
    record.contact = Contact {
        dealer: non_empty(first_text(&root, "#item_head")?),
        hotline: non_empty(first_text(&root, "#item_phone span")?),
        address: non_empty(
            address
                .strip_prefix("Địa chỉ:")
                .map(str::trim_start)
                .unwrap_or(&address)
                .to_string(),
        ),
        ..Contact::default()
    };
    record.gallery = extract_gallery(&document, base)?;

    Ok(record)
}

/// Used-car salons in Đắk Lắk listed on bonbanh.com.
pub struct BonbanhSource {
    profile: ProviderProfile,
    http: HttpFetcher,
    // detail pages come from caller URLs, so redirects stay on allowed hosts
    detail_http: HttpFetcher,
    salon_pages: FetchPool<Vec<Listing>>,
}

const ALLOWED_HOSTS: &[&str] = &["bonbanh.com", "www.bonbanh.com"];

impl BonbanhSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let base = Url::parse(BASE_URL)?;
        Self::with_base_url(config, base)
    }

    pub fn with_base_url(config: &ScraperConfig, base_url: Url) -> Result<Self> {
        Self::with_hosts(config, base_url, ALLOWED_HOSTS)
    }

    pub fn with_hosts(config: &ScraperConfig, base_url: Url, allowed_hosts: &[&str]) -> Result<Self> {
        let profile = ProviderProfile::new(SOURCE_ID, SOURCE_NAME, base_url, allowed_hosts);
        Ok(Self {
            http: HttpFetcher::new(config, "Bonbanh")?,
            detail_http: HttpFetcher::restricted_to(config, "Bonbanh", &profile.allowed_hosts)?,
            profile,
            salon_pages: FetchPool::new(
                config.pool_workers,
                config.pool_request_timeout(),
                config.pool_result_ttl(),
            ),
        })
    }
}

#[async_trait]
impl ListingSource for BonbanhSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let base = self.profile.base_url.clone();
        let list_url = base.join(SALON_LIST_PATH)?;
        let html = self.http.get_text(list_url.as_str()).await?;
        let salons = parse_salon_list(&html, &base)?;
        if salons.is_empty() {
            return Err(anyhow!("No salons found in Đắk Lắk on Bonbanh"));
        }
        tracing::debug!(source = SOURCE_ID, salons = salons.len(), "Fetching salon pages");

        let urls: Vec<String> = salons.iter().map(|s| s.url.clone()).collect();
        let http = self.http.clone();
        let salons_by_url = salons.clone();
        let mut results = self
            .salon_pages
            .fetch_all(urls, move |url: String| {
                let http = http.clone();
                let base = base.clone();
                let salon = salons_by_url.iter().find(|s| s.url == url).cloned();
                async move {
                    let salon = salon.ok_or_else(|| anyhow!("Unknown salon URL {}", url))?;
                    let html = http.get_text(&url).await?;
                    let page_base = Url::parse(&url).unwrap_or(base);
                    parse_salon_cars(&html, &salon, &page_base)
                }
            })
            .await;

        // pages finish in any order; the first salon listing a car keeps it
        results.sort_by_key(|(url, _)| salons.iter().position(|s| s.url == *url));

        let mut seen = HashSet::new();
        let mut cars = Vec::new();
        for (url, result) in results {
            match result {
                Ok(listings) => {
                    for car in listings {
                        if seen.insert(car.id.clone()) {
                            cars.push(car);
                        }
                    }
                }
                Err(message) => {
                    tracing::warn!(source = SOURCE_ID, salon = %url, error = %message, "Skipping salon");
                }
            }
        }

        Ok(cars)
    }
}

#[async_trait]
impl DetailSource for BonbanhSource {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn fetch_detail(&self, url: &Url) -> Result<DetailRecord> {
        let html = self.detail_http.get_text(url.as_str()).await?;
        parse_detail(&html, url, &self.profile.base_url)
    }
}
