use crate::config::FuzzyDedupeConfig;
use crate::types::Article;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Collapse duplicate articles, preserving the output position of each
/// key's first occurrence. Tier 1 matches on exact id (GUID or canonical
/// URL); tier 2, when enabled, treats near-identical titles from the same
/// source as duplicates even across different ids. Collisions keep the
/// article with the earliest `published_at`; ties keep the first seen.
pub fn dedupe(articles: Vec<Article>, config: &FuzzyDedupeConfig) -> Vec<Article> {
    let original = articles.len();
    let mut kept: Vec<Article> = Vec::with_capacity(articles.len());
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut shingles: Vec<HashSet<[char; 2]>> = Vec::new();

    for article in articles {
        let slot = by_id.get(&article.id).copied().or_else(|| {
            if !config.enabled {
                return None;
            }
            let candidate = title_shingles(&article.title);
            (0..kept.len()).find(|&index| {
                kept[index].tab == article.tab
                    && kept[index].source == article.source
                    && jaccard(&shingles[index], &candidate) >= config.threshold
            })
        });

        match slot {
            Some(index) => {
                if article.published_at < kept[index].published_at {
                    debug!(id = %article.id, "replacing duplicate with earlier article");
                    by_id.remove(&kept[index].id);
                    by_id.insert(article.id.clone(), index);
                    shingles[index] = title_shingles(&article.title);
                    kept[index] = article;
                } else {
                    debug!(id = %article.id, "dropping duplicate");
                }
            }
            None => {
                by_id.insert(article.id.clone(), kept.len());
                shingles.push(title_shingles(&article.title));
                kept.push(article);
            }
        }
    }

    if kept.len() < original {
        info!(
            before = original,
            after = kept.len(),
            "removed duplicate articles"
        );
    }
    kept
}

/// Character-bigram shingles over the lowercased, punctuation-free title.
/// Bigrams work for whitespace-free CJK titles and Latin titles alike.
fn title_shingles(title: &str) -> HashSet<[char; 2]> {
    let cleaned: Vec<char> = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if cleaned.len() < 2 {
        return cleaned.iter().map(|&c| [c, ' ']).collect();
    }
    cleaned.windows(2).map(|pair| [pair[0], pair[1]]).collect()
}

fn jaccard(a: &HashSet<[char; 2]>, b: &HashSet<[char; 2]>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Language, TabKey};
    use chrono::{Duration, TimeZone, Utc};

    fn article(id: &str, title: &str, source: &str, hours_ago: i64) -> Article {
        let base = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        Article {
            id: id.to_string(),
            title: title.to_string(),
            source: source.to_string(),
            url: format!("https://example.com/{id}"),
            published_at: base - Duration::hours(hours_ago),
            raw_content: String::new(),
            language: Language::Zh,
            tab: TabKey::Zh,
            feed_category: None,
            category: None,
            card_type: None,
            summary: None,
            summary_source: None,
        }
    }

    fn exact_only() -> FuzzyDedupeConfig {
        FuzzyDedupeConfig {
            enabled: false,
            threshold: 0.85,
        }
    }

    fn with_fuzzy() -> FuzzyDedupeConfig {
        FuzzyDedupeConfig {
            enabled: true,
            threshold: 0.85,
        }
    }

    #[test]
    fn keeps_distinct_articles_in_order() {
        let input = vec![
            article("a", "First", "S1", 0),
            article("b", "Second", "S1", 1),
            article("c", "Third", "S2", 2),
        ];
        let out = dedupe(input, &exact_only());
        let ids: Vec<&str> = out.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn exact_collision_keeps_earliest_published() {
        let input = vec![
            article("x", "Late copy", "S1", 0),
            article("b", "Other", "S1", 1),
            article("x", "Early copy", "S1", 5),
        ];
        let out = dedupe(input, &exact_only());
        assert_eq!(out.len(), 2);
        // Earlier article wins but occupies the first occurrence's slot.
        assert_eq!(out[0].title, "Early copy");
        assert_eq!(out[1].id, "b");
    }

    #[test]
    fn exact_collision_tie_keeps_first_seen() {
        let input = vec![
            article("x", "First seen", "S1", 3),
            article("x", "Second seen", "S1", 3),
        ];
        let out = dedupe(input, &exact_only());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "First seen");
    }

    #[test]
    fn fuzzy_collapses_near_identical_titles_from_same_source() {
        let input = vec![
            article("a", "Breaking News Today!", "S1", 0),
            article("b", "Breaking News Today", "S1", 1),
        ];
        let out = dedupe(input, &with_fuzzy());
        assert_eq!(out.len(), 1);
        // Earlier of the two wins.
        assert_eq!(out[0].id, "b");
    }

    #[test]
    fn fuzzy_keeps_same_title_from_different_sources() {
        let input = vec![
            article("a", "Breaking News Today", "S1", 0),
            article("b", "Breaking News Today", "S2", 1),
        ];
        let out = dedupe(input, &with_fuzzy());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn fuzzy_disabled_keeps_near_duplicates() {
        let input = vec![
            article("a", "Breaking News Today!", "S1", 0),
            article("b", "Breaking News Today", "S1", 1),
        ];
        let out = dedupe(input, &exact_only());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let input = vec![
            article("a", "台股收盤大漲三百點", "中央社", 0),
            article("a", "台股收盤大漲三百點", "中央社", 2),
            article("b", "美股開盤走低", "中央社", 1),
        ];
        let once = dedupe(input, &with_fuzzy());
        let twice = dedupe(once.clone(), &with_fuzzy());
        let ids_once: Vec<&str> = once.iter().map(|a| a.id.as_str()).collect();
        let ids_twice: Vec<&str> = twice.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids_once, ids_twice);
    }

    #[test]
    fn handles_empty_input() {
        assert!(dedupe(Vec::new(), &exact_only()).is_empty());
    }
}
