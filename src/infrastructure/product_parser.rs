//! HTML parsing and field extraction for the Replmoa shop
//!
//! Specialized extractor for 영카트/그누보드 기반 쇼핑몰 마크업: 상품명,
//! 카테고리 브레드크럼, 가격, 대표/설명 이미지, 옵션(select) 추출.
//! Extraction is best-effort: missing fields default to empty/zero and
//! malformed markup never produces an error.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domain::product::{ProductOptionGroup, ProductOptionValue, ProductRecord};

/// 옵션 값의 추가금액 패턴: `블랙 (+ 5,000원)`
static OPTION_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([+-]?\s*[\d,]+)\s*원\)").unwrap());
/// 가격이 제거된 뒤 남는 `+ 0원` 류의 꼬리 패턴
static OPTION_PRICE_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[+-]\s*\d+\s*원").unwrap());
/// 사이트맵 XML의 location 엔트리
static SITEMAP_LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").unwrap());

/// 설명 영역 끝에 붙는 공지성 이미지 - 갤러리에서 제외
const EXCLUDED_GALLERY_IMAGES: &[&str] =
    &["https://replmoa1.com/data/editor/2409/f43f6efd43e8ac62b2810d06535ee845_1727412960_5405.jpg"];

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid CSS selector '{selector}'")]
    InvalidSelector { selector: String },
}

/// CSS selectors for the shop's item pages
#[derive(Debug, Clone)]
pub struct ProductParserConfig {
    pub base_url: String,
    pub title_selector: String,
    pub breadcrumb_selector: String,
    pub market_price_selector: String,
    pub sale_price_selector: String,
    pub primary_image_selector: String,
    pub gallery_selector: String,
    pub option_select_selector: String,
    pub listing_link_selector: String,
}

impl Default for ProductParserConfig {
    fn default() -> Self {
        Self {
            base_url: "https://replmoa1.com".to_string(),
            title_selector: "#sit_title, .stitle".to_string(),
            breadcrumb_selector: "#sit_ov".to_string(),
            market_price_selector: ".price_wr.price_og span".to_string(),
            sale_price_selector: ".price_wr.price span".to_string(),
            primary_image_selector: "#sit_pvi_big img, .sit_pvi img".to_string(),
            gallery_selector: "#sit_inf img, .sit_inf img, #sit_inf_explan img, \
                               #sit_desc img, .sit_desc img, .item_explan img, \
                               .product-detail img"
                .to_string(),
            option_select_selector: "#sit_opt_added select, .sit_opt_added select, \
                                     #sit_option select, .sit_option select, \
                                     select[name^='opt'], select[id^='it_opt'], \
                                     .item_option select"
                .to_string(),
            listing_link_selector: "a[href*='item.php']".to_string(),
        }
    }
}

/// Field extractor over one fetched page body.
pub struct ProductPageParser {
    config: ProductParserConfig,
    title: Selector,
    breadcrumb: Selector,
    market_price: Selector,
    sale_price: Selector,
    primary_image: Selector,
    gallery: Selector,
    option_select: Selector,
    option_item: Selector,
    listing_link: Selector,
}

fn parse_selector(selector: &str) -> Result<Selector, ParserError> {
    Selector::parse(selector).map_err(|_| ParserError::InvalidSelector {
        selector: selector.to_string(),
    })
}

impl ProductPageParser {
    pub fn new() -> Result<Self, ParserError> {
        Self::with_config(ProductParserConfig::default())
    }

    pub fn with_config(config: ProductParserConfig) -> Result<Self, ParserError> {
        Ok(Self {
            title: parse_selector(&config.title_selector)?,
            breadcrumb: parse_selector(&config.breadcrumb_selector)?,
            market_price: parse_selector(&config.market_price_selector)?,
            sale_price: parse_selector(&config.sale_price_selector)?,
            primary_image: parse_selector(&config.primary_image_selector)?,
            gallery: parse_selector(&config.gallery_selector)?,
            option_select: parse_selector(&config.option_select_selector)?,
            option_item: parse_selector("option")?,
            listing_link: parse_selector(&config.listing_link_selector)?,
            config,
        })
    }

    /// 상품 상세 페이지에서 레코드 추출 (best-effort)
    pub fn parse_product(&self, body: &str, source_url: &str) -> ProductRecord {
        let html = Html::parse_document(body);

        let name = html
            .select(&self.title)
            .next()
            .map(|el| collect_text(&el))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "상품명 없음".to_string());

        let raw_category = self.extract_breadcrumb(&html);
        let department_price = self.extract_price(&html, &self.market_price);
        let price = self.extract_price(&html, &self.sale_price);

        let image_url = html
            .select(&self.primary_image)
            .next()
            .and_then(|el| el.value().attr("src"))
            .map(|src| self.resolve_url(src))
            .unwrap_or_default();

        let gallery_images = self.extract_gallery(&html);
        let options = self.extract_options(&html);

        debug!(
            "Parsed product '{}' ({} gallery images, {} option groups)",
            name,
            gallery_images.len(),
            options.len()
        );

        ProductRecord {
            name,
            raw_category,
            price,
            department_price,
            image_url,
            gallery_images,
            source_url: source_url.to_string(),
            options,
        }
    }

    /// 목록 페이지에서 상품 상세 링크 추출
    pub fn extract_listing_links(&self, body: &str) -> Vec<String> {
        let html = Html::parse_document(body);
        let mut seen = std::collections::HashSet::new();
        html.select(&self.listing_link)
            .filter_map(|el| el.value().attr("href"))
            .map(|href| self.resolve_url(href))
            .filter(|href| seen.insert(href.clone()))
            .collect()
    }

    /// 사이트맵 XML에서 item.php 상세 URL 추출
    pub fn extract_sitemap_item_urls(&self, xml: &str) -> Vec<String> {
        SITEMAP_LOC_RE
            .captures_iter(xml)
            .map(|cap| cap[1].to_string())
            .filter(|loc| loc.contains("item.php"))
            .collect()
    }

    fn extract_breadcrumb(&self, html: &Html) -> String {
        // sit_ov 영역의 텍스트 중 '>'를 포함한 첫 후보가 카테고리 노출 문자열
        html.select(&self.breadcrumb)
            .next()
            .and_then(|el| {
                el.text()
                    .map(str::trim)
                    .find(|t| t.contains('>') && !t.contains("상품간략정보"))
                    .map(ToString::to_string)
            })
            .unwrap_or_default()
    }

    fn extract_price(&self, html: &Html, selector: &Selector) -> i64 {
        html.select(selector)
            .next()
            .map(|el| parse_price_text(&collect_text(&el)))
            .unwrap_or(0)
    }

    fn extract_gallery(&self, html: &Html) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        html.select(&self.gallery)
            .filter_map(|el| el.value().attr("src"))
            .filter(|src| !src.is_empty())
            .map(|src| self.resolve_url(src))
            .filter(|src| !EXCLUDED_GALLERY_IMAGES.contains(&src.as_str()))
            .filter(|src| seen.insert(src.clone()))
            .collect()
    }

    fn extract_options(&self, html: &Html) -> Vec<ProductOptionGroup> {
        let mut groups: Vec<ProductOptionGroup> = Vec::new();
        let mut seen_names = std::collections::HashSet::new();

        for select_el in html.select(&self.option_select) {
            let name = option_group_name(&select_el);

            let values: Vec<ProductOptionValue> = select_el
                .select(&self.option_item)
                .filter_map(|opt| parse_option_value(&collect_text(&opt)))
                .collect();

            // 중복 옵션 그룹은 첫 번째 것만 유지
            if !values.is_empty() && seen_names.insert(name.clone()) {
                groups.push(ProductOptionGroup { name, values });
            }
        }
        groups
    }

    fn resolve_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            return href.to_string();
        }
        Url::parse(&self.config.base_url)
            .and_then(|base| base.join(href))
            .map(String::from)
            .unwrap_or_else(|_| href.to_string())
    }

    pub fn config(&self) -> &ProductParserConfig {
        &self.config
    }
}

fn collect_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// select 요소의 옵션명 결정: 직전 label 텍스트, 없으면 name/id 속성 추정
fn option_group_name(select_el: &ElementRef) -> String {
    for sibling in select_el.prev_siblings() {
        if let Some(el) = scraper::ElementRef::wrap(sibling) {
            if el.value().name() == "label" {
                let label = collect_text(&el);
                if !label.is_empty() {
                    return label.trim_end_matches(':').trim().to_string();
                }
            }
        }
    }

    let el = select_el.value();
    let attr = el.attr("name").or_else(|| el.attr("id")).unwrap_or("");
    let attr_lower = attr.to_lowercase();
    if attr_lower.contains("color") || attr.contains("컬러") {
        "컬러".to_string()
    } else if attr_lower.contains("size") || attr.contains("사이즈") {
        "사이즈".to_string()
    } else {
        "옵션".to_string()
    }
}

/// 옵션 텍스트 한 건을 값/추가금액으로 분해
///
/// `"블랙 (+ 5,000원)"` -> value `블랙`, adjustment `5000`.
/// `선택` 안내 문구와 `-` 플레이스홀더는 제외(None)합니다.
pub fn parse_option_value(text: &str) -> Option<ProductOptionValue> {
    let text = text.trim();
    if text.is_empty() || text.contains("선택") || text == "-" {
        return None;
    }

    let mut price_adjustment = 0_i64;
    if let Some(cap) = OPTION_PRICE_RE.captures(text) {
        let amount: String = cap[1].chars().filter(|c| c.is_ascii_digit()).collect();
        price_adjustment = amount.parse().unwrap_or(0);
        if cap[1].trim_start().starts_with('-') {
            price_adjustment = -price_adjustment;
        }
    }

    let value = OPTION_PRICE_RE.replace_all(text, "");
    let value = OPTION_PRICE_TAIL_RE.replace_all(&value, "");
    let value = value.trim().to_string();
    if value.is_empty() {
        return None;
    }

    Some(ProductOptionValue {
        value,
        price_adjustment,
    })
}

/// 가격 문자열에서 숫자만 추출: `"1,234,000원"` -> 1234000
pub fn parse_price_text(text: &str) -> i64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
