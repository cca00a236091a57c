use crate::config::DigestConfig;
use crate::selector::SectionKey;
use crate::types::{
    taipei_offset, Article, Digest, DigestCard, DigestError, DigestSection, DigestTab, Result,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Compose the final digest document. Tabs and sections follow the order
/// declared in configuration, never alphabetical order. Tabs without any
/// surviving section are dropped; a run where nothing survives at all is
/// surfaced as [`DigestError::EmptyRun`] for the caller to decide on.
pub fn assemble(
    date: NaiveDate,
    selected: &BTreeMap<SectionKey, Vec<Article>>,
    config: &DigestConfig,
) -> Result<Digest> {
    let mut tabs = Vec::new();

    for tab_spec in &config.tabs {
        let mut sections = Vec::new();
        for category in &tab_spec.categories {
            let key = (tab_spec.key, category.key.clone());
            let Some(articles) = selected.get(&key) else {
                continue;
            };
            sections.push(DigestSection {
                key: category.key.clone(),
                label: category.label.clone(),
                cards: articles.iter().map(card_from_article).collect(),
            });
        }
        if sections.is_empty() {
            warn!(tab = %tab_spec.key, "tab has no sections, omitting");
            continue;
        }
        tabs.push(DigestTab {
            key: tab_spec.key,
            label: tab_spec.label.clone(),
            sections,
        });
    }

    if tabs.is_empty() {
        return Err(DigestError::EmptyRun);
    }

    info!(tabs = tabs.len(), "digest assembled");
    Ok(Digest {
        date: date.format("%Y-%m-%d").to_string(),
        tabs,
    })
}

fn card_from_article(article: &Article) -> DigestCard {
    let local_date = article
        .published_at
        .with_timezone(&taipei_offset())
        .format("%Y-%m-%d");
    DigestCard {
        card_type: article.card_type.unwrap_or(crate::types::CardType::Small),
        title: article.title.clone(),
        meta: format!("{} · {}", article.source, local_date),
        summary: article.summary.clone().unwrap_or_default(),
        url: article.url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategorySpec, TabSpec};
    use crate::types::{CardType, Language, SummarySource, TabKey};
    use chrono::{TimeZone, Utc};

    fn config() -> DigestConfig {
        DigestConfig {
            tabs: vec![TabSpec {
                key: TabKey::Zh,
                label: "每日新聞".to_string(),
                language: Language::Zh,
                categories: vec![
                    CategorySpec {
                        key: "頭條新聞".to_string(),
                        label: "頭條新聞".to_string(),
                    },
                    CategorySpec {
                        key: "股市".to_string(),
                        label: "股市".to_string(),
                    },
                ],
            }],
            feeds: Vec::new(),
            rules: Vec::new(),
            selection: Default::default(),
            summarization: Default::default(),
            fetch: Default::default(),
            budget_secs: 600,
        }
    }

    fn article(id: &str, rank: usize) -> Article {
        Article {
            id: id.to_string(),
            title: format!("標題 {id}"),
            source: "中央社".to_string(),
            url: format!("https://example.tw/{id}"),
            // 23:30 UTC lands on the next day in Taipei.
            published_at: Utc.with_ymd_and_hms(2026, 8, 6, 23, 30, 0).unwrap(),
            raw_content: String::new(),
            language: Language::Zh,
            tab: TabKey::Zh,
            feed_category: None,
            category: Some("股市".to_string()),
            card_type: Some(match rank {
                0 => CardType::Hero,
                1 | 2 => CardType::Medium,
                _ => CardType::Small,
            }),
            summary: Some("摘要內容".to_string()),
            summary_source: Some(SummarySource::Llm),
        }
    }

    fn section(ids: &[&str]) -> Vec<Article> {
        ids.iter()
            .enumerate()
            .map(|(rank, id)| article(id, rank))
            .collect()
    }

    #[test]
    fn sections_follow_config_order() {
        let mut selected = BTreeMap::new();
        // BTreeMap orders 股市 before 頭條新聞; config declares the reverse.
        selected.insert((TabKey::Zh, "股市".to_string()), section(&["a", "b", "c", "d", "e"]));
        selected.insert(
            (TabKey::Zh, "頭條新聞".to_string()),
            section(&["f", "g", "h", "i", "j"]),
        );

        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let digest = assemble(date, &selected, &config()).unwrap();
        assert_eq!(digest.date, "2026-08-07");
        let keys: Vec<&str> = digest.tabs[0]
            .sections
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(keys, vec!["頭條新聞", "股市"]);
    }

    #[test]
    fn card_meta_uses_taipei_date() {
        let mut selected = BTreeMap::new();
        selected.insert((TabKey::Zh, "股市".to_string()), section(&["a", "b", "c", "d", "e"]));

        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let digest = assemble(date, &selected, &config()).unwrap();
        let card = &digest.tabs[0].sections[0].cards[0];
        // Published 2026-08-06T23:30Z == 2026-08-07 07:30 in Taipei.
        assert_eq!(card.meta, "中央社 · 2026-08-07");
    }

    #[test]
    fn empty_selection_is_an_empty_run() {
        let selected = BTreeMap::new();
        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let err = assemble(date, &selected, &config()).unwrap_err();
        assert!(matches!(err, DigestError::EmptyRun));
    }

    #[test]
    fn digest_serializes_to_schema_shape() {
        let mut selected = BTreeMap::new();
        selected.insert((TabKey::Zh, "股市".to_string()), section(&["a", "b", "c", "d", "e"]));

        let date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let digest = assemble(date, &selected, &config()).unwrap();
        let value = serde_json::to_value(&digest).unwrap();

        assert_eq!(value["tabs"][0]["key"], "zh");
        assert_eq!(value["tabs"][0]["sections"][0]["cards"].as_array().unwrap().len(), 5);
        assert_eq!(value["tabs"][0]["sections"][0]["cards"][0]["type"], "hero");
        assert!(value["tabs"][0]["sections"][0]["cards"][0]["meta"]
            .as_str()
            .unwrap()
            .contains(" · "));
    }
}
