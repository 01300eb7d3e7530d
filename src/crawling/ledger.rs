//! 중복 수집 방지 원장
//!
//! 이미 처리한 상품 키(`ItemId`)의 인메모리 집합. 실행 시작 시 저장소에
//! 남아있는 레코드에서 시드되어, 이전 실행이 저장한 상품을 다시 가져오지
//! 않게 합니다. 배치 구성 단계(단일 스레드)에서만 접근하므로 잠금이
//! 필요 없습니다. 정확성의 최종 보루는 싱크의 `(name, category_id)`
//! 검사이고, 원장은 refetch를 줄이는 최적화입니다.

use std::collections::HashSet;

use crate::domain::product::ItemId;

#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<ItemId>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 영속 레코드에서 추출한 키로 원장을 시드
    pub fn seed<I: IntoIterator<Item = ItemId>>(&mut self, ids: I) {
        self.seen.extend(ids);
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.seen.contains(&id)
    }

    pub fn record(&mut self, id: ItemId) {
        self.seen.insert(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
