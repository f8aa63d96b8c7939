//! Derives the displayed listing and its summary from the deal collection.
//!
//! Everything here is a pure function of its inputs: the collection is only
//! read, and the current date is passed in rather than read from a cache.

use chrono::NaiveDate;

use crate::models::{Deal, DealFilter, Stage, Stats, Valuation};

/// Stages counted as "active" unless settings say otherwise.
pub const DEFAULT_ACTIVE_STAGES: [Stage; 2] = [Stage::Lead, Stage::Negotiation];

/// Valuation tier counted as a key deal.
pub const KEY_VALUATION: Valuation = Valuation::S;

const UNKNOWN_LABEL: &str = "-";
const GENERIC_BADGE: &str = "badge";

pub fn project(deals: &[Deal], filter: &DealFilter) -> Vec<Deal> {
    let keyword = filter.keyword.trim().to_lowercase();

    let mut projected: Vec<Deal> = deals
        .iter()
        .filter(|deal| filter.stage.matches(deal.stage))
        .filter(|deal| keyword.is_empty() || deal.search_text().to_lowercase().contains(&keyword))
        .cloned()
        .collect();

    // sort_by_key is stable, so equal dates keep their input order
    projected.sort_by_key(|deal| deal.next_action_date.unwrap_or(NaiveDate::MAX));
    projected
}

pub fn summarize(deals: &[Deal], active_stages: &[Stage]) -> Stats {
    deals.iter().fold(
        Stats {
            total_count: deals.len(),
            ..Stats::default()
        },
        |mut stats, deal| {
            if active_stages.contains(&deal.stage) {
                stats.active_count += 1;
            }
            if deal.valuation == Some(KEY_VALUATION) {
                stats.key_count += 1;
            }
            if deal.stage == Stage::Won {
                stats.won_count += 1;
            }
            stats
        },
    )
}

pub fn stage_label(raw: &str) -> &'static str {
    Stage::parse(raw).map(Stage::label).unwrap_or(UNKNOWN_LABEL)
}

pub fn stage_badge_class(raw: &str) -> &'static str {
    Stage::parse(raw).map(Stage::badge_class).unwrap_or(GENERIC_BADGE)
}

pub fn valuation_label(raw: &str) -> &'static str {
    Valuation::ALL
        .into_iter()
        .find(|valuation| valuation.as_str() == raw)
        .map(Valuation::label)
        .unwrap_or(UNKNOWN_LABEL)
}

pub fn valuation_label_of(valuation: Option<Valuation>) -> &'static str {
    valuation.map(Valuation::label).unwrap_or(UNKNOWN_LABEL)
}

pub fn probability_label(probability: Option<u32>) -> String {
    match probability {
        Some(value) => format!("{}%", value),
        None => UNKNOWN_LABEL.to_string(),
    }
}

pub fn is_overdue(next_action_date: Option<NaiveDate>, stage: Stage, today: NaiveDate) -> bool {
    match next_action_date {
        Some(date) => date < today && !stage.is_closed(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageFilter;

    fn deal(id: &str, stage: Stage, next_action: Option<&str>) -> Deal {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("title {}", id),
            "company": format!("company {}", id),
            "stage": stage.as_str(),
            "nextActionDate": next_action,
        }))
        .expect("fixture deal")
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date")
    }

    fn ids(deals: &[Deal]) -> Vec<&str> {
        deals.iter().map(|deal| deal.id.as_str()).collect()
    }

    #[test]
    fn all_stage_and_blank_keyword_keep_every_deal() {
        let deals = vec![
            deal("d1", Stage::Won, None),
            deal("d2", Stage::Lead, Some("2026-01-10")),
            deal("d3", Stage::Lost, Some("2026-01-05")),
        ];
        let filter = DealFilter {
            stage: StageFilter::All,
            keyword: "   ".to_string(),
        };

        let projected = project(&deals, &filter);
        assert_eq!(projected.len(), deals.len());
        assert_eq!(ids(&projected), vec!["d3", "d2", "d1"]);
    }

    #[test]
    fn stage_filter_keeps_exact_matches_only() {
        let deals = vec![
            deal("d1", Stage::Won, None),
            deal("d2", Stage::Lead, None),
            deal("d3", Stage::Won, None),
        ];
        let filter = DealFilter {
            stage: StageFilter::Only(Stage::Won),
            keyword: String::new(),
        };
        assert_eq!(ids(&project(&deals, &filter)), vec!["d1", "d3"]);
    }

    #[test]
    fn keyword_matches_case_insensitively_across_text_fields() {
        let mut acme = deal("d1", Stage::Lead, None);
        acme.company = "ACME Trading".to_string();
        let mut memo = deal("d2", Stage::Lead, None);
        memo.note = "Follow up with Acme procurement".to_string();
        let mut contact = deal("d3", Stage::Lead, None);
        contact.contact = "Tanaka".to_string();
        let other = deal("d4", Stage::Lead, None);

        let deals = vec![acme, memo, contact, other];
        let filter = DealFilter {
            stage: StageFilter::All,
            keyword: "  acme ".to_string(),
        };
        assert_eq!(ids(&project(&deals, &filter)), vec!["d1", "d2"]);

        let by_contact = DealFilter {
            stage: StageFilter::All,
            keyword: "TANAKA".to_string(),
        };
        assert_eq!(ids(&project(&deals, &by_contact)), vec!["d3"]);
    }

    #[test]
    fn sort_is_stable_and_puts_undated_deals_last() {
        let deals = vec![
            deal("undated-1", Stage::Lead, None),
            deal("late", Stage::Lead, Some("2026-03-01")),
            deal("same-a", Stage::Lead, Some("2026-02-01")),
            deal("undated-2", Stage::Lead, None),
            deal("same-b", Stage::Lead, Some("2026-02-01")),
        ];

        let projected = project(&deals, &DealFilter::default());
        assert_eq!(
            ids(&projected),
            vec!["same-a", "same-b", "late", "undated-1", "undated-2"]
        );
    }

    #[test]
    fn project_leaves_input_untouched_and_is_repeatable() {
        let deals = vec![
            deal("d1", Stage::Lead, Some("2026-05-01")),
            deal("d2", Stage::Lead, Some("2026-04-01")),
        ];
        let before = deals.clone();
        let filter = DealFilter::default();

        let first = project(&deals, &filter);
        let second = project(&deals, &filter);
        assert_eq!(first, second);
        assert_eq!(deals, before);
    }

    #[test]
    fn summarize_counts_active_key_and_won() {
        let deals: Vec<Deal> = serde_json::from_value(serde_json::json!([
            { "id": "d1", "stage": "won", "valuation": "valu-s" },
            { "id": "d2", "stage": "lead", "valuation": "valu-b" }
        ]))
        .expect("fixture deals");

        let stats = summarize(&project(&deals, &DealFilter::default()), &DEFAULT_ACTIVE_STAGES);
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.won_count, 1);
        assert_eq!(stats.key_count, 1);
        assert_eq!(stats.active_count, 1);

        let proposal_active = summarize(&deals, &[Stage::Proposal, Stage::Negotiation]);
        assert_eq!(proposal_active.active_count, 0);
    }

    #[test]
    fn labels_fall_back_for_unknown_input() {
        assert_eq!(stage_label("unknown"), "-");
        assert_eq!(stage_label(""), "-");
        assert_eq!(stage_badge_class("unknown"), "badge");
        assert_eq!(stage_label("negotiation"), "Negotiation");
        assert_eq!(stage_badge_class("won"), "badge badge--won");
        assert_eq!(valuation_label("valu-a"), "A");
        assert_eq!(valuation_label("a"), "-");
        assert_eq!(valuation_label_of(None), "-");
        assert_eq!(probability_label(Some(40)), "40%");
        assert_eq!(probability_label(None), "-");
    }

    #[test]
    fn overdue_requires_past_date_and_open_stage() {
        let today = date("2026-10-16");
        let yesterday = Some(date("2026-10-15"));

        assert!(is_overdue(yesterday, Stage::Proposal, today));
        assert!(!is_overdue(Some(today), Stage::Proposal, today));
        assert!(!is_overdue(yesterday, Stage::Won, today));
        assert!(!is_overdue(yesterday, Stage::Lost, today));
        assert!(!is_overdue(None, Stage::Lead, today));
    }
}
