use crate::errors::{AppError, AppResult};
use crate::models::{Deal, DealDraft, DealFilter, DeskSettings, StageFilter, Stats, StatsScope};
use crate::projector::{project, summarize};
use crate::storage::KeyValueStore;
use crate::store::DealStore;

/// Asks the user before a destructive action.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeskView {
    pub filter: DealFilter,
    pub rows: Vec<Deal>,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Declined,
    Applied { removed: bool, view: DeskView },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub deal: Deal,
    pub view: DeskView,
}

pub const DELETE_PROMPT: &str = "Delete this deal?";

/// A deal store paired with its current filter and settings. Every mutating
/// call persists first and then hands back a freshly derived view.
pub struct Desk<S> {
    store: DealStore<S>,
    filter: DealFilter,
    settings: DeskSettings,
}

impl<S: KeyValueStore> Desk<S> {
    pub fn open(storage: S, settings: DeskSettings) -> Self {
        let store = DealStore::open(storage);
        let filter = store.load_filter();
        Self {
            store,
            filter,
            settings,
        }
    }

    pub fn store(&self) -> &DealStore<S> {
        &self.store
    }

    pub fn filter(&self) -> &DealFilter {
        &self.filter
    }

    pub fn settings(&self) -> &DeskSettings {
        &self.settings
    }

    pub fn view(&self) -> DeskView {
        let rows = project(self.store.deals(), &self.filter);
        let stats = match self.settings.stats_scope {
            StatsScope::Filtered => summarize(&rows, &self.settings.active_stages),
            StatsScope::All => summarize(self.store.deals(), &self.settings.active_stages),
        };
        DeskView {
            filter: self.filter.clone(),
            rows,
            stats,
        }
    }

    /// A blank form, preset with the configured defaults.
    pub fn new_draft(&self) -> DealDraft {
        DealDraft {
            stage: self.settings.default_stage,
            valuation: self.settings.default_valuation,
            ..DealDraft::default()
        }
    }

    pub fn draft_for_edit(&self, id: &str) -> AppResult<DealDraft> {
        self.store
            .get(id)
            .map(Deal::to_draft)
            .ok_or_else(|| AppError::NotFound(format!("deal {}", id)))
    }

    pub fn submit(&mut self, draft: DealDraft) -> AppResult<Submission> {
        let deal = match draft.id.clone().filter(|id| !id.trim().is_empty()) {
            Some(id) => self.store.update(&id, draft)?,
            None => self.store.create(draft)?,
        };
        Ok(Submission {
            deal,
            view: self.view(),
        })
    }

    pub fn delete(&mut self, id: &str, confirm: &mut dyn Confirm) -> AppResult<DeleteOutcome> {
        if !confirm.confirm(DELETE_PROMPT) {
            tracing::debug!(deal_id = %id, "delete declined");
            return Ok(DeleteOutcome::Declined);
        }
        let removed = self.store.delete(id)?;
        Ok(DeleteOutcome::Applied {
            removed,
            view: self.view(),
        })
    }

    pub fn set_filter(&mut self, filter: DealFilter) -> AppResult<DeskView> {
        self.store.save_filter(&filter)?;
        self.filter = filter;
        Ok(self.view())
    }

    pub fn set_stage_filter(&mut self, stage: StageFilter) -> AppResult<DeskView> {
        let filter = DealFilter {
            stage,
            ..self.filter.clone()
        };
        self.set_filter(filter)
    }

    pub fn set_keyword(&mut self, keyword: impl Into<String>) -> AppResult<DeskView> {
        let filter = DealFilter {
            keyword: keyword.into(),
            ..self.filter.clone()
        };
        self.set_filter(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::{AssumeYes, Confirm, DeleteOutcome, Desk};
    use crate::errors::AppError;
    use crate::models::{DealDraft, DeskSettings, Stage, StageFilter, StatsScope, Valuation};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    struct Decline {
        asked: usize,
    }

    impl Confirm for Decline {
        fn confirm(&mut self, _prompt: &str) -> bool {
            self.asked += 1;
            false
        }
    }

    fn draft(title: &str, stage: Stage, valuation: Valuation) -> DealDraft {
        DealDraft {
            title: title.to_string(),
            company: format!("{} Inc", title),
            stage,
            valuation: Some(valuation),
            ..DealDraft::default()
        }
    }

    #[test]
    fn submit_returns_view_that_includes_the_new_deal() {
        let mut desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        let submitted = desk
            .submit(draft("Alpha", Stage::Lead, Valuation::S))
            .expect("submit");

        assert_eq!(submitted.view.rows.len(), 1);
        assert_eq!(submitted.view.rows[0].id, submitted.deal.id);
        assert_eq!(submitted.view.stats.total_count, 1);
        assert_eq!(submitted.view.stats.active_count, 1);
        assert_eq!(submitted.view.stats.key_count, 1);
    }

    #[test]
    fn submit_with_id_edits_in_place() {
        let mut desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        let created = desk
            .submit(draft("Alpha", Stage::Lead, Valuation::A))
            .expect("submit")
            .deal;

        let mut edit = desk.draft_for_edit(&created.id).expect("draft");
        edit.stage = Stage::Won;
        let view = desk.submit(edit).expect("edit").view;

        assert_eq!(desk.store().deals().len(), 1);
        assert_eq!(view.rows[0].stage, Stage::Won);
        assert_eq!(view.stats.won_count, 1);
    }

    #[test]
    fn rejected_submit_leaves_view_unchanged() {
        let mut desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        desk.submit(draft("Alpha", Stage::Lead, Valuation::A))
            .expect("submit");
        let before = desk.view();

        let result = desk.submit(draft("", Stage::Lead, Valuation::A));
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(desk.view(), before);
    }

    #[test]
    fn delete_only_happens_after_confirmation() {
        let mut desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        let id = desk
            .submit(draft("Alpha", Stage::Lead, Valuation::A))
            .expect("submit")
            .deal
            .id;

        let mut decline = Decline { asked: 0 };
        let outcome = desk.delete(&id, &mut decline).expect("delete");
        assert_eq!(outcome, DeleteOutcome::Declined);
        assert_eq!(decline.asked, 1);
        assert_eq!(desk.store().deals().len(), 1);

        match desk.delete(&id, &mut AssumeYes).expect("delete") {
            DeleteOutcome::Applied { removed, view } => {
                assert!(removed);
                assert!(view.rows.is_empty());
                assert_eq!(view.stats.total_count, 0);
            }
            DeleteOutcome::Declined => panic!("delete should have been applied"),
        }
    }

    #[test]
    fn filtered_stats_follow_the_filter_and_all_scope_ignores_it() {
        let mut desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        desk.submit(draft("Alpha", Stage::Won, Valuation::S)).expect("submit");
        desk.submit(draft("Beta", Stage::Lead, Valuation::B)).expect("submit");

        let view = desk
            .set_stage_filter(StageFilter::Only(Stage::Lead))
            .expect("filter");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.stats.total_count, 1);
        assert_eq!(view.stats.won_count, 0);

        let settings = DeskSettings {
            stats_scope: StatsScope::All,
            ..DeskSettings::default()
        };
        let storage = Arc::new(MemoryStore::new());
        let mut all_scope = Desk::open(Arc::clone(&storage), settings);
        all_scope
            .submit(draft("Alpha", Stage::Won, Valuation::S))
            .expect("submit");
        all_scope
            .submit(draft("Beta", Stage::Lead, Valuation::B))
            .expect("submit");
        let view = all_scope.set_keyword("beta").expect("keyword");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.stats.total_count, 2);
        assert_eq!(view.stats.won_count, 1);
    }

    #[test]
    fn filter_survives_reopen() {
        let storage = Arc::new(MemoryStore::new());
        {
            let mut desk = Desk::open(Arc::clone(&storage), DeskSettings::default());
            desk.set_stage_filter(StageFilter::Only(Stage::Proposal))
                .expect("stage");
            desk.set_keyword("renewal").expect("keyword");
        }

        let desk = Desk::open(storage, DeskSettings::default());
        assert_eq!(desk.filter().stage, StageFilter::Only(Stage::Proposal));
        assert_eq!(desk.filter().keyword, "renewal");
    }

    #[test]
    fn new_draft_uses_configured_defaults() {
        let settings = DeskSettings {
            default_stage: Stage::Hearing,
            default_valuation: None,
            ..DeskSettings::default()
        };
        let desk = Desk::open(MemoryStore::new(), settings);
        let draft = desk.new_draft();
        assert_eq!(draft.stage, Stage::Hearing);
        assert_eq!(draft.valuation, None);
        assert!(draft.id.is_none());
    }

    #[test]
    fn editing_unknown_deal_is_not_found() {
        let desk = Desk::open(MemoryStore::new(), DeskSettings::default());
        assert!(matches!(
            desk.draft_for_edit("deal_missing"),
            Err(AppError::NotFound(_))
        ));
    }
}
