use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::errors::{AppError, AppResult};

/// Pipeline position of a deal. Any stage may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Lead,
    Hearing,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::Lead,
        Self::Hearing,
        Self::Proposal,
        Self::Negotiation,
        Self::Won,
        Self::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Hearing => "hearing",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Lead => "Lead",
            Self::Hearing => "Hearing",
            Self::Proposal => "Proposal",
            Self::Negotiation => "Negotiation",
            Self::Won => "Won",
            Self::Lost => "Lost",
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            Self::Lead => "badge badge--lead",
            Self::Hearing => "badge badge--hearing",
            Self::Proposal => "badge badge--proposal",
            Self::Negotiation => "badge badge--negotiation",
            Self::Won => "badge badge--won",
            Self::Lost => "badge badge--lost",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Valuation {
    #[serde(rename = "valu-s")]
    S,
    #[serde(rename = "valu-a")]
    A,
    #[serde(rename = "valu-b")]
    B,
    #[serde(rename = "valu-c")]
    C,
}

impl Valuation {
    pub const ALL: [Valuation; 4] = [Self::S, Self::A, Self::B, Self::C];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "valu-s",
            Self::A => "valu-a",
            Self::B => "valu-b",
            Self::C => "valu-c",
        }
    }

    /// Accepts both the stored form (`valu-s`) and the bare tier letter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "valu-s" | "s" => Some(Self::S),
            "valu-a" | "a" => Some(Self::A),
            "valu-b" | "b" => Some(Self::B),
            "valu-c" | "c" => Some(Self::C),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, alias = "contactLabel")]
    pub contact: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub valuation: Option<Valuation>,
    #[serde(default, deserialize_with = "lenient_probability")]
    pub probability: Option<u32>,
    pub stage: Stage,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub next_action_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deal {
    pub fn from_draft(
        id: String,
        draft: DealDraft,
        created_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: draft.title,
            company: draft.company,
            contact: draft.contact,
            valuation: draft.valuation,
            probability: draft.probability,
            stage: draft.stage,
            next_action_date: draft.next_action_date,
            note: draft.note,
            amount: draft.amount,
            created_at,
            updated_at: Some(updated_at),
        }
    }

    /// Text the keyword filter matches against.
    pub fn search_text(&self) -> String {
        format!("{} {} {} {}", self.company, self.title, self.contact, self.note)
    }

    pub fn memo_text(&self) -> Option<&str> {
        let memo = self.note.trim();
        if memo.is_empty() {
            None
        } else {
            Some(memo)
        }
    }

    pub fn to_draft(&self) -> DealDraft {
        DealDraft {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            company: self.company.clone(),
            contact: self.contact.clone(),
            valuation: self.valuation,
            probability: self.probability,
            stage: self.stage,
            next_action_date: self.next_action_date,
            note: self.note.clone(),
            amount: self.amount,
        }
    }
}

/// Submitted form contents. A present `id` marks the submission as an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DealDraft {
    pub id: Option<String>,
    pub title: String,
    pub company: String,
    pub contact: String,
    pub valuation: Option<Valuation>,
    pub probability: Option<u32>,
    pub stage: Stage,
    pub next_action_date: Option<NaiveDate>,
    pub note: String,
    pub amount: Option<f64>,
}

impl Default for DealDraft {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            company: String::new(),
            contact: String::new(),
            valuation: Some(Valuation::S),
            probability: None,
            stage: Stage::Lead,
            next_action_date: None,
            note: String::new(),
            amount: None,
        }
    }
}

impl DealDraft {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if let Some(probability) = self.probability {
            if probability > 100 {
                return Err(AppError::Validation(format!(
                    "probability must be between 0 and 100, got {}",
                    probability
                )));
            }
        }
        if let Some(amount) = self.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(AppError::Validation(format!(
                    "amount must be a non-negative number, got {}",
                    amount
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StageFilter {
    #[default]
    All,
    Only(Stage),
}

impl StageFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == "all" {
            return Some(Self::All);
        }
        Stage::parse(raw).map(Self::Only)
    }

    pub fn matches(self, stage: Stage) -> bool {
        match self {
            Self::All => true,
            Self::Only(expected) => expected == stage,
        }
    }
}

impl TryFrom<String> for StageFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown stage filter: {}", value))
    }
}

impl From<StageFilter> for String {
    fn from(value: StageFilter) -> Self {
        match value {
            StageFilter::All => "all".to_string(),
            StageFilter::Only(stage) => stage.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DealFilter {
    pub stage: StageFilter,
    pub keyword: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_count: usize,
    pub active_count: usize,
    pub key_count: usize,
    pub won_count: usize,
}

/// Which deals the summary statistics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatsScope {
    #[default]
    Filtered,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeskSettings {
    pub stats_scope: StatsScope,
    pub active_stages: Vec<Stage>,
    pub default_stage: Stage,
    pub default_valuation: Option<Valuation>,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            stats_scope: StatsScope::Filtered,
            active_stages: crate::projector::DEFAULT_ACTIVE_STAGES.to_vec(),
            default_stage: Stage::Lead,
            default_valuation: Some(Valuation::S),
        }
    }
}

/// Treats `null`, a missing key and a blank string the same way: unset.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(other) => T::deserialize(other).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Older records hold whatever number the form produced: fractions are
/// rounded, negatives and non-numeric text are dropped.
fn lenient_probability<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match &value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(raw)) => raw.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match number {
        Some(number) if number.is_finite() && number >= 0.0 => {
            Ok(Some(number.round().min(u32::MAX as f64) as u32))
        }
        _ => {
            tracing::warn!(value = ?value, "dropping unusable stored probability");
            Ok(None)
        }
    }
}
