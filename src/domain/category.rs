//! 카테고리 정규화 - 브레드크럼 텍스트를 계층형 카테고리 트리로 변환
//!
//! `"남성 > 가방 > 고야드 > 토트백"` 형태의 원본 카테고리 문자열을
//! 부모 슬러그가 연결된 최대 4뎁스 `CategoryNode` 목록으로 변환합니다.
//! I/O가 없는 순수 함수 모듈이며, 저장소 상태는 건드리지 않습니다.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum breadcrumb depth carried into the taxonomy.
/// 성별 > 상품종류 > 브랜드 > 세부카테고리
pub const MAX_CATEGORY_DEPTH: usize = 4;

/// Fallback segment for empty or unparsable breadcrumbs.
pub const FALLBACK_CATEGORY_NAME: &str = "기타";
pub const FALLBACK_CATEGORY_SLUG: &str = "etc";

/// 대분류(depth 1) 매핑 테이블
static MAIN_CATEGORY_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("남성", "men"),
        ("여성", "women"),
        ("국내출고상품", "domestic"),
        ("국내출고 상품", "domestic"),
        ("국내출고", "domestic"),
        ("국내 출고", "domestic"),
    ])
});

/// 중분류(depth 2) 매핑 테이블
static SUB_CATEGORY_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("가방", "bag"),
        ("지갑", "wallet"),
        ("시계", "watch"),
        ("신발", "shoes"),
        ("벨트", "belt"),
        ("악세서리", "accessory"),
        ("액세서리", "accessory"),
        ("모자", "hat"),
        ("의류", "clothing"),
        ("선글라스&안경", "glasses"),
        ("선글라스", "glasses"),
        ("안경", "glasses"),
        ("기타", "etc"),
        ("가방&지갑", "bag-wallet"),
        ("패션잡화", "fashion"),
        ("생활&주방용품", "home"),
        ("향수", "perfume"),
        ("라이터", "lighter"),
    ])
});

/// One level of the normalized category tree.
///
/// `slug` is globally unique across the taxonomy; `depth` is the 1-based
/// position in the breadcrumb that produced this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub name: String,
    pub slug: String,
    pub parent_slug: Option<String>,
    pub depth: u32,
}

/// 텍스트를 URL-safe 슬러그로 변환
///
/// 소문자화 후 `[0-9a-z가-힣-]` 밖의 문자 연속은 하이픈 하나로 치환하고,
/// 앞뒤 하이픈은 제거합니다. 결과가 비면 `"etc"`를 반환합니다.
/// 멱등성: `slugify(slugify(x)) == slugify(x)`.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());

    for ch in lowered.chars() {
        let allowed = ch.is_ascii_digit()
            || ch.is_ascii_lowercase()
            || ('가'..='힣').contains(&ch);
        if allowed {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            // 허용되지 않는 문자 연속(하이픈 자신 포함)은 하이픈 하나로 축약
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        FALLBACK_CATEGORY_SLUG.to_string()
    } else {
        slug
    }
}

/// Split a raw breadcrumb into trimmed, non-empty segments.
pub fn split_breadcrumb(raw: &str) -> Vec<String> {
    raw.split('>')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// 원본 카테고리 문자열을 정규화된 카테고리 노드 목록으로 변환
///
/// 반환 목록은 depth 1부터 순서대로 정렬되며, 마지막 노드가 상품이 연결될
/// leaf 카테고리입니다. 지원 깊이(4)를 넘는 세그먼트는 무시합니다.
pub fn normalize_category(raw: &str) -> Vec<CategoryNode> {
    let mut segments = split_breadcrumb(raw);
    if segments.is_empty() {
        segments.push(FALLBACK_CATEGORY_NAME.to_string());
    }
    segments.truncate(MAX_CATEGORY_DEPTH);

    let mut nodes: Vec<CategoryNode> = Vec::with_capacity(segments.len());
    for (idx, name) in segments.iter().enumerate() {
        let slug = match idx {
            // 상위 두 레벨만 고정 매핑 테이블을 사용한다
            0 => MAIN_CATEGORY_MAP
                .get(name.as_str())
                .map_or_else(|| slugify(name), ToString::to_string),
            1 => {
                let base = SUB_CATEGORY_MAP
                    .get(name.as_str())
                    .map_or_else(|| slugify(name), ToString::to_string);
                format!("{}-{}", nodes[0].slug, base)
            }
            // 브랜드/세부 카테고리는 항상 부모 슬러그 + slugify
            _ => format!("{}-{}", nodes[idx - 1].slug, slugify(name)),
        };

        let parent_slug = if idx == 0 {
            None
        } else {
            Some(nodes[idx - 1].slug.clone())
        };

        nodes.push(CategoryNode {
            name: name.clone(),
            slug,
            parent_slug,
            depth: (idx + 1) as u32,
        });
    }

    nodes
}

/// 카테고리 필터 매칭
///
/// 빈 필터는 모든 카테고리를 통과시킵니다. 그 외에는 원본 문자열의
/// 접두 일치 또는 세그먼트 단위 전위 일치를 허용합니다.
pub fn matches_filter(raw_category: &str, filter: &str) -> bool {
    let filter = filter.trim();
    if filter.is_empty() {
        return true;
    }
    let raw = raw_category.trim();
    if raw.starts_with(filter) {
        return true;
    }

    let raw_segments = split_breadcrumb(raw);
    let filter_segments = split_breadcrumb(filter);
    if filter_segments.is_empty() || filter_segments.len() > raw_segments.len() {
        return false;
    }
    filter_segments
        .iter()
        .zip(raw_segments.iter())
        .all(|(f, r)| f == r)
}
