use crate::config::SelectionConfig;
use crate::types::{Article, CardType, TabKey};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub type SectionKey = (TabKey, String);

/// Group classified articles by (tab, category). Articles without a
/// category never reach this stage.
pub fn group_by_category(articles: Vec<Article>) -> BTreeMap<SectionKey, Vec<Article>> {
    let mut groups: BTreeMap<SectionKey, Vec<Article>> = BTreeMap::new();
    for article in articles {
        let Some(category) = article.category.clone() else {
            warn!(id = %article.id, "article reached selector without category");
            continue;
        };
        groups.entry((article.tab, category)).or_default().push(article);
    }
    groups
}

/// Choose exactly `items_per_section` articles per section: candidates are
/// walked in recency order, candidates from a source that already hit the
/// per-source cap are skipped, and sections that cannot fill the quota are
/// omitted outright rather than padded. Rank determines the card size.
pub fn select(
    groups: BTreeMap<SectionKey, Vec<Article>>,
    config: &SelectionConfig,
) -> BTreeMap<SectionKey, Vec<Article>> {
    let mut selected = BTreeMap::new();

    for ((tab, category), mut candidates) in groups {
        // Stable sort: equal timestamps keep feed iteration order, which
        // keeps the whole pipeline deterministic for fixed input.
        candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut per_source: HashMap<String, usize> = HashMap::new();
        let mut picked: Vec<Article> = Vec::with_capacity(config.items_per_section);

        for article in candidates {
            if picked.len() == config.items_per_section {
                break;
            }
            let count = per_source.entry(article.source.clone()).or_insert(0);
            if *count >= config.per_source_cap {
                continue;
            }
            *count += 1;
            picked.push(article);
        }

        if picked.len() < config.items_per_section {
            warn!(
                %tab,
                category,
                have = picked.len(),
                need = config.items_per_section,
                "section has insufficient content, omitting"
            );
            continue;
        }

        for (rank, article) in picked.iter_mut().enumerate() {
            article.card_type = Some(card_type_for_rank(rank));
        }

        info!(%tab, category, picked = picked.len(), "section selected");
        selected.insert((tab, category), picked);
    }

    selected
}

/// Rank 1 is the hero card, ranks 2-3 medium, the rest small.
fn card_type_for_rank(rank: usize) -> CardType {
    match rank {
        0 => CardType::Hero,
        1 | 2 => CardType::Medium,
        _ => CardType::Small,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;
    use chrono::{Duration, TimeZone, Utc};

    fn article(id: &str, source: &str, hours_ago: i64) -> Article {
        let base = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        Article {
            id: id.to_string(),
            title: format!("Title {id}"),
            source: source.to_string(),
            url: format!("https://example.tw/{id}"),
            published_at: base - Duration::hours(hours_ago),
            raw_content: String::new(),
            language: Language::Zh,
            tab: TabKey::Zh,
            feed_category: None,
            category: Some("股市".to_string()),
            card_type: None,
            summary: None,
            summary_source: None,
        }
    }

    fn config() -> SelectionConfig {
        SelectionConfig::default()
    }

    fn key() -> SectionKey {
        (TabKey::Zh, "股市".to_string())
    }

    #[test]
    fn selects_five_most_recent() {
        let candidates = vec![
            article("a", "S1", 6),
            article("b", "S2", 1),
            article("c", "S3", 2),
            article("d", "S4", 3),
            article("e", "S5", 4),
            article("f", "S6", 5),
        ];
        let mut groups = BTreeMap::new();
        groups.insert(key(), candidates);

        let selected = select(groups, &config());
        let picked = &selected[&key()];
        let ids: Vec<&str> = picked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d", "e", "f"]);
    }

    #[test]
    fn per_source_cap_skips_but_preserves_recency_order() {
        // Six entries from one source and two from another; no more than
        // two from any source may survive.
        let candidates = vec![
            article("a1", "Dominant", 1),
            article("a2", "Dominant", 2),
            article("a3", "Dominant", 3),
            article("a4", "Dominant", 4),
            article("b1", "Other", 5),
            article("b2", "Other", 6),
            article("c1", "Third", 7),
        ];
        let mut groups = BTreeMap::new();
        groups.insert(key(), candidates);

        let selected = select(groups, &config());
        let picked = &selected[&key()];
        let ids: Vec<&str> = picked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "b1", "b2", "c1"]);
    }

    #[test]
    fn assigns_card_types_by_rank() {
        let candidates = (0..5)
            .map(|i| article(&format!("a{i}"), &format!("S{i}"), i))
            .collect();
        let mut groups = BTreeMap::new();
        groups.insert(key(), candidates);

        let selected = select(groups, &config());
        let picked = &selected[&key()];
        let types: Vec<CardType> = picked.iter().map(|a| a.card_type.unwrap()).collect();
        assert_eq!(
            types,
            vec![
                CardType::Hero,
                CardType::Medium,
                CardType::Medium,
                CardType::Small,
                CardType::Small
            ]
        );
    }

    #[test]
    fn omits_section_with_insufficient_candidates() {
        let mut groups = BTreeMap::new();
        groups.insert(
            key(),
            vec![article("a", "S1", 0), article("b", "S2", 1), article("c", "S3", 2)],
        );
        groups.insert(
            (TabKey::Zh, "頭條新聞".to_string()),
            (0..5)
                .map(|i| article(&format!("h{i}"), &format!("S{i}"), i))
                .collect(),
        );

        let selected = select(groups, &config());
        assert!(!selected.contains_key(&key()));
        assert!(selected.contains_key(&(TabKey::Zh, "頭條新聞".to_string())));
    }

    #[test]
    fn cap_can_leave_section_underfilled() {
        // Seven candidates but only two sources: the cap leaves four
        // survivors, so the section is omitted.
        let candidates = vec![
            article("a1", "S1", 1),
            article("a2", "S1", 2),
            article("a3", "S1", 3),
            article("a4", "S1", 4),
            article("b1", "S2", 5),
            article("b2", "S2", 6),
            article("b3", "S2", 7),
        ];
        let mut groups = BTreeMap::new();
        groups.insert(key(), candidates);

        let selected = select(groups, &config());
        assert!(selected.is_empty());
    }

    #[test]
    fn equal_timestamps_keep_feed_order() {
        let candidates: Vec<Article> = (0..6)
            .map(|i| article(&format!("t{i}"), &format!("S{i}"), 3))
            .collect();
        let mut groups = BTreeMap::new();
        groups.insert(key(), candidates);

        let selected = select(groups, &config());
        let ids: Vec<&str> = selected[&key()].iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4"]);
    }
}
