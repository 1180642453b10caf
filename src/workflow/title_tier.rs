//! Title tier resolver
//!
//! Deterministic keyword matching of free-text titles to three configured
//! seniority tiers. Tier I is checked first, so a title matching several
//! tiers always gets the highest one.

use tracing::{debug, info};

use super::fields::split_values;
use crate::config::TitleTierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    I,
    II,
    III,
}

impl Tier {
    pub fn column_value(&self) -> &'static str {
        match self {
            Tier::I => "tier_i",
            Tier::II => "tier_ii",
            Tier::III => "tier_iii",
        }
    }

    pub fn predicate(&self) -> String {
        format!("title_tier = '{}'", self.column_value())
    }
}

#[derive(Debug, Clone)]
pub struct TitleTierResolver {
    tiers: [(Tier, Vec<String>); 3],
}

impl TitleTierResolver {
    pub fn new(config: &TitleTierConfig) -> Self {
        let norm = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            tiers: [
                (Tier::I, norm(&config.tier_i)),
                (Tier::II, norm(&config.tier_ii)),
                (Tier::III, norm(&config.tier_iii)),
            ],
        }
    }

    /// Tier for a single title: containment either way, first tier wins
    pub fn match_tier(&self, title: &str) -> Option<Tier> {
        let normalized = title.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        for (tier, keywords) in &self.tiers {
            if let Some(keyword) = keywords
                .iter()
                .find(|k| normalized.contains(k.as_str()) || k.contains(normalized.as_str()))
            {
                debug!("Matched '{}' to {} (keyword: {})", title, tier.column_value(), keyword);
                return Some(*tier);
            }
        }
        debug!("No tier match found for title: {}", title);
        None
    }

    /// Predicate for a (possibly comma-delimited) title
    ///
    /// Unmatched titles contribute nothing. Distinct predicates are joined
    /// with OR inside parentheses, in tier order.
    pub fn condition(&self, title: &str) -> Option<String> {
        let mut tiers: Vec<Tier> = split_values(title)
            .into_iter()
            .filter_map(|t| self.match_tier(t))
            .collect();
        tiers.sort();
        tiers.dedup();

        let condition = match tiers.as_slice() {
            [] => return None,
            [single] => single.predicate(),
            many => format!(
                "({})",
                many.iter()
                    .map(Tier::predicate)
                    .collect::<Vec<_>>()
                    .join(" OR ")
            ),
        };
        info!("Title condition for '{}': {}", title, condition);
        Some(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TitleTierResolver {
        TitleTierResolver::new(&TitleTierConfig::default())
    }

    #[test]
    fn test_owner_is_tier_i() {
        assert_eq!(resolver().condition("owner").as_deref(), Some("title_tier = 'tier_i'"));
    }

    #[test]
    fn test_higher_tier_wins() {
        // "managing director" matches tier_i and contains tier_ii's "director"
        assert_eq!(resolver().match_tier("Managing Director"), Some(Tier::I));
        assert_eq!(resolver().match_tier("Sales Director"), Some(Tier::II));
    }

    #[test]
    fn test_keyword_containing_title() {
        assert_eq!(resolver().match_tier("vice"), Some(Tier::II));
    }

    #[test]
    fn test_multiple_titles_or_dedup() {
        let r = resolver();
        assert_eq!(
            r.condition("manager, CEO, owner").as_deref(),
            Some("(title_tier = 'tier_i' OR title_tier = 'tier_iii')")
        );
        assert_eq!(r.condition("owner, founder").as_deref(), Some("title_tier = 'tier_i'"));
    }

    #[test]
    fn test_unmatched_title() {
        assert_eq!(resolver().condition("astronaut"), None);
        assert_eq!(resolver().condition(" , "), None);
    }
}
