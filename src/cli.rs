use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::db::Database;
use crate::desk::{AssumeYes, Confirm, DeleteOutcome, Desk, DeskView};
use crate::errors::AppResult;
use crate::models::{DealDraft, DealFilter, Stage, StageFilter, Valuation};
use crate::projector::{is_overdue, probability_label, valuation_label_of};

#[derive(Debug, Parser)]
#[command(name = "deal-desk")]
#[command(about = "Track sales deals, their next actions and pipeline stats")]
pub struct Cli {
    /// Directory holding the database and logs
    #[arg(long, default_value = ".deal-desk")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record a new deal
    Add(DealArgs),
    /// Change an existing deal; options left out keep their stored value
    Edit {
        id: String,
        #[command(flatten)]
        fields: DealArgs,
    },
    /// Remove a deal after confirmation
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the filtered listing; given options replace the saved filter
    List {
        #[arg(long, value_parser = parse_stage_filter)]
        stage: Option<StageFilter>,
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Show summary statistics; `statsScope` decides whether the filter applies
    Stats,
    /// Show or change the stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print the stored settings
    Show,
    /// Merge a JSON object into the stored settings
    Set { json: String },
}

#[derive(Debug, Default, Args)]
pub struct DealArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub contact: Option<String>,
    /// s, a, b or c
    #[arg(long, value_parser = parse_valuation)]
    pub valuation: Option<Valuation>,
    /// Win likelihood in percent
    #[arg(long)]
    pub probability: Option<u32>,
    #[arg(long, value_parser = parse_stage)]
    pub stage: Option<Stage>,
    /// Next action date, YYYY-MM-DD
    #[arg(long = "next-action", value_parser = parse_date)]
    pub next_action: Option<NaiveDate>,
    /// Drop the scheduled next action
    #[arg(long, conflicts_with = "next_action")]
    pub clear_next_action: bool,
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub amount: Option<f64>,
}

impl DealArgs {
    pub fn apply(self, draft: &mut DealDraft) {
        if let Some(title) = self.title {
            draft.title = title.trim().to_string();
        }
        if let Some(company) = self.company {
            draft.company = company.trim().to_string();
        }
        if let Some(contact) = self.contact {
            draft.contact = contact;
        }
        if let Some(valuation) = self.valuation {
            draft.valuation = Some(valuation);
        }
        if let Some(probability) = self.probability {
            draft.probability = Some(probability);
        }
        if let Some(stage) = self.stage {
            draft.stage = stage;
        }
        if let Some(next_action) = self.next_action {
            draft.next_action_date = Some(next_action);
        }
        if self.clear_next_action {
            draft.next_action_date = None;
        }
        if let Some(note) = self.note {
            draft.note = note;
        }
        if let Some(amount) = self.amount {
            draft.amount = Some(amount);
        }
    }
}

/// Reads a yes/no answer from stdin.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        eprint!("{} [y/N] ", prompt);
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let db_path = cli.data_dir.join("state.sqlite");
    let db = Arc::new(
        Database::new(&db_path).with_context(|| format!("opening database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db.path().display(), "database opened");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut confirm = StdinConfirm;
    execute(cli.command, db, &mut out, &mut confirm)?;
    Ok(())
}

pub fn execute(
    command: Command,
    db: Arc<Database>,
    out: &mut dyn Write,
    confirm: &mut dyn Confirm,
) -> AppResult<()> {
    let settings = db.get_settings()?;
    let mut desk = Desk::open(Arc::clone(&db), settings);
    let today = Local::now().date_naive();

    match command {
        Command::Add(fields) => {
            let mut draft = desk.new_draft();
            fields.apply(&mut draft);
            let submitted = desk.submit(draft)?;
            writeln!(out, "created {}", submitted.deal.id)?;
            write!(out, "{}", render_view(&submitted.view, today))?;
        }
        Command::Edit { id, fields } => {
            let mut draft = desk.draft_for_edit(&id)?;
            fields.apply(&mut draft);
            let submitted = desk.submit(draft)?;
            writeln!(out, "updated {}", submitted.deal.id)?;
            write!(out, "{}", render_view(&submitted.view, today))?;
        }
        Command::Delete { id, yes } => {
            let outcome = if yes {
                desk.delete(&id, &mut AssumeYes)?
            } else {
                desk.delete(&id, confirm)?
            };
            match outcome {
                DeleteOutcome::Declined => writeln!(out, "kept {}", id)?,
                DeleteOutcome::Applied { removed, view } => {
                    if removed {
                        writeln!(out, "deleted {}", id)?;
                    } else {
                        writeln!(out, "no deal {}", id)?;
                    }
                    write!(out, "{}", render_view(&view, today))?;
                }
            }
        }
        Command::List { stage, keyword } => {
            let view = if stage.is_some() || keyword.is_some() {
                let current = desk.filter().clone();
                desk.set_filter(DealFilter {
                    stage: stage.unwrap_or(current.stage),
                    keyword: keyword.unwrap_or(current.keyword),
                })?
            } else {
                desk.view()
            };
            write!(out, "{}", render_view(&view, today))?;
        }
        Command::Stats => {
            writeln!(out, "{}", render_stats(&desk.view()))?;
        }
        Command::Settings { action } => {
            let settings = match action {
                SettingsAction::Show => db.get_settings()?,
                SettingsAction::Set { json } => {
                    let update: serde_json::Value = serde_json::from_str(&json)
                        .map_err(|error| crate::errors::AppError::Validation(error.to_string()))?;
                    db.update_settings(update)?
                }
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&settings)?)?;
        }
    }

    Ok(())
}

pub fn render_view(view: &DeskView, today: NaiveDate) -> String {
    let mut rendered = format!(
        "filter: stage={} keyword={:?}\n",
        String::from(view.filter.stage),
        view.filter.keyword
    );

    if view.rows.is_empty() {
        rendered.push_str("(no deals)\n");
    } else {
        rendered.push_str(&format!(
            "{:<12} {:<32} {:<3} {:<5} {:<12} {}\n",
            "STAGE", "COMPANY / TITLE", "VAL", "PROB", "NEXT", "ID"
        ));
        for deal in &view.rows {
            let company = if deal.company.is_empty() { "-" } else { deal.company.as_str() };
            let next = match deal.next_action_date {
                Some(date) if is_overdue(Some(date), deal.stage, today) => format!("{}!", date),
                Some(date) => date.to_string(),
                None => "-".to_string(),
            };
            rendered.push_str(&format!(
                "{:<12} {:<32} {:<3} {:<5} {:<12} {}\n",
                deal.stage.label(),
                format!("{} / {}", company, deal.title),
                valuation_label_of(deal.valuation),
                probability_label(deal.probability),
                next,
                deal.id
            ));
            if let Some(memo) = deal.memo_text() {
                rendered.push_str(&format!("{:<12} {}\n", "", memo));
            }
        }
    }

    rendered.push_str(&render_stats(view));
    rendered.push('\n');
    rendered
}

pub fn render_stats(view: &DeskView) -> String {
    format!(
        "total: {}  active: {}  key: {}  won: {}",
        view.stats.total_count, view.stats.active_count, view.stats.key_count, view.stats.won_count
    )
}

fn parse_stage(raw: &str) -> Result<Stage, String> {
    Stage::parse(raw.trim()).ok_or_else(|| format!("unknown stage: {}", raw))
}

fn parse_stage_filter(raw: &str) -> Result<StageFilter, String> {
    StageFilter::parse(raw).ok_or_else(|| format!("unknown stage filter: {}", raw))
}

fn parse_valuation(raw: &str) -> Result<Valuation, String> {
    Valuation::parse(raw).ok_or_else(|| format!("unknown valuation: {}", raw))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|error| error.to_string())
}
