//! 그래프 확장 - 시드 조문에서 참조/형제 관계를 따라 관련 조문 수집
//!
//! 시드마다 독립적으로 너비 우선 탐색을 하고, 결과를 최소 홉 수 기준으로 합칩니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;

use crate::config::ExpansionConfig;
use crate::error::SourceError;
use crate::graph::{ArticleKey, GraphStore, StoredArticle};

use super::candidate::{Candidate, SearchMethod};

/// 그래프 확장기
pub struct GraphExpander {
    store: Arc<dyn GraphStore>,
    config: ExpansionConfig,
}

impl GraphExpander {
    pub fn new(store: Arc<dyn GraphStore>, config: ExpansionConfig) -> Self {
        Self { store, config }
    }

    /// 기본 최대 홉 수
    pub fn max_depth(&self) -> u32 {
        self.config.max_depth
    }

    /// 시드 조문에서 `max_depth` 홉까지 확장
    ///
    /// - 시드는 홉 0으로 결과에 포함됩니다 (시드의 점수/소스는 그대로).
    /// - 새로 도달한 조문은 `SearchMethod::Graph`, 점수 0으로 추가됩니다.
    /// - 같은 조문에 여러 시드가 도달하면 가장 작은 홉 수와 그 시드를 남깁니다.
    /// - 그래프 저장소 오류는 `SourceError::Unavailable`로 보고합니다.
    pub async fn expand(
        &self,
        seeds: &[Candidate],
        max_depth: u32,
    ) -> Result<Vec<Candidate>, SourceError> {
        let mut seen_seeds = HashSet::new();
        let seeds: Vec<&Candidate> = seeds.iter().filter(|s| seen_seeds.insert(s.key())).collect();
        if seeds.is_empty() {
            return Ok(vec![]);
        }

        let traversals = join_all(
            seeds
                .iter()
                .map(|seed| self.traverse(seed.key(), max_depth)),
        )
        .await;

        let mut order: Vec<ArticleKey> = Vec::new();
        let mut merged: HashMap<ArticleKey, Candidate> = HashMap::new();

        for seed in &seeds {
            let mut candidate = (*seed).clone();
            candidate.graph_hop_distance = Some(0);
            candidate.related_to = Some(seed.metadata.article_number.clone());
            order.push(candidate.key());
            merged.insert(candidate.key(), candidate);
        }

        for (seed, traversal) in seeds.iter().zip(traversals) {
            let reached =
                traversal.map_err(|e| SourceError::unavailable(SearchMethod::Graph, format!("{:#}", e)))?;

            for (stored, hop) in reached {
                let key = stored.key();
                match merged.get_mut(&key) {
                    Some(existing) => {
                        if existing.graph_hop_distance.map_or(true, |h| hop < h) {
                            existing.graph_hop_distance = Some(hop);
                            existing.related_to = Some(seed.metadata.article_number.clone());
                        }
                    }
                    None => {
                        let mut candidate = Candidate::from_article(&stored, SearchMethod::Graph);
                        candidate.graph_hop_distance = Some(hop);
                        candidate.related_to = Some(seed.metadata.article_number.clone());
                        order.push(key.clone());
                        merged.insert(key, candidate);
                    }
                }
            }
        }

        let expanded: Vec<Candidate> = order
            .into_iter()
            .filter_map(|key| merged.remove(&key))
            .collect();

        tracing::debug!(
            "Graph expansion: {} seeds -> {} articles (depth {})",
            seeds.len(),
            expanded.len(),
            max_depth
        );
        Ok(expanded)
    }

    /// 한 시드에서의 너비 우선 탐색
    ///
    /// 조문은 한 번만 방문하므로 순환 참조가 있어도 종료합니다.
    async fn traverse(&self, seed: ArticleKey, max_depth: u32) -> Result<Vec<(StoredArticle, u32)>> {
        let mut visited: HashSet<ArticleKey> = HashSet::from([seed.clone()]);
        let mut frontier = vec![seed];
        let mut reached = Vec::new();

        for hop in 1..=max_depth {
            let mut next = Vec::new();

            for key in &frontier {
                let mut neighbors = self.store.referenced_neighbors(key).await?;
                if self.config.include_siblings && self.config.sibling_window > 0 {
                    neighbors.extend(
                        self.store
                            .sibling_articles(key, self.config.sibling_window)
                            .await?,
                    );
                }

                for neighbor in neighbors {
                    let neighbor_key = neighbor.key();
                    if visited.insert(neighbor_key.clone()) {
                        next.push(neighbor_key);
                        reached.push((neighbor, hop));
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(reached)
    }
}

// ============================================================================
// Tests
// ============================================================================
