//! Intent-driven row retrieval over the CRM tables.
//!
//! Every lookup works on the lowercased question. Lookups never fail: a
//! question that matches nothing yields an empty table.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use ledger_core::table::{Table, Value};
use ledger_storage::TableStore;

use crate::types::{Category, Intent, RetrievedContext};

const ACCOUNT_COLUMN: &str = "account";
const CONTACT_COLUMN: &str = "contact_name";
const MANAGER_COLUMN: &str = "manager";
const AGENT_COLUMN: &str = "sales_agent";
const STAGE_COLUMN: &str = "deal_stage";
const TIMESTAMP_COLUMN: &str = "timestamp";

const OPEN_STAGES: [&str; 2] = ["engaging", "prospecting"];
const WON_STAGE: &str = "won";

// =============================================================================
// RetrievalDispatcher
// =============================================================================

/// Selects the rows relevant to a question, using the intent to pick which
/// tables to search.
#[derive(Debug, Clone)]
pub struct RetrievalDispatcher {
    store: Arc<TableStore>,
}

impl RetrievalDispatcher {
    pub fn new(store: Arc<TableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    /// Run the retrieval routine for `intent`.
    pub fn dispatch(&self, intent: Intent, question: &str) -> RetrievedContext {
        let mut context = RetrievedContext::new();
        match intent {
            Intent::AccountInfo => context.push(Category::Accounts, self.accounts(question)),
            Intent::ContactInteraction => {
                context.push(Category::Interactions, self.interactions(question))
            }
            Intent::SalesHierarchy => context.push(Category::SalesTeam, self.sales_team(question)),
            Intent::ProductInfo => context.push(Category::Products, self.products()),
            Intent::PipelineInfo => context.push(Category::Pipeline, self.pipeline(question)),
            Intent::BestDeal => context.push(Category::Pipeline, self.best_deals()),
            Intent::Followup => {
                context.push(Category::Accounts, self.accounts(question));
                context.push(Category::Interactions, self.interactions(question));
            }
            Intent::GeneralQuestion => {}
        }

        debug!(
            intent = %intent,
            sections = context.sections().len(),
            rows = context.total_rows(),
            "Retrieval complete"
        );
        context
    }

    /// Rows for the account(s) named in the question.
    pub fn accounts(&self, question: &str) -> Table {
        entity_lookup(self.store.accounts(), ACCOUNT_COLUMN, &question.to_lowercase())
    }

    /// Interactions for the contact(s) named in the question, most recent
    /// first.
    pub fn interactions(&self, question: &str) -> Table {
        entity_lookup(self.store.interactions(), CONTACT_COLUMN, &question.to_lowercase())
            .sorted_by_datetime_desc(TIMESTAMP_COLUMN)
    }

    /// A manager's whole team, else one agent's rows, else the full table.
    pub fn sales_team(&self, question: &str) -> Table {
        let q = question.to_lowercase();
        let teams = self.store.sales_teams();

        for column in [MANAGER_COLUMN, AGENT_COLUMN] {
            let Some(idx) = teams.column_index(column) else {
                continue;
            };
            if let Some(name) = longest_full_match(&distinct_names(teams, idx), &q) {
                return teams.filter_eq(column, &name);
            }
        }
        teams.clone()
    }

    /// Pipeline rows filtered by the stage keywords in the question.
    pub fn pipeline(&self, question: &str) -> Table {
        let q = question.to_lowercase();
        let pipeline = self.store.pipeline();

        if q.contains("open") {
            stage_filter(pipeline, &OPEN_STAGES)
        } else if q.contains("closed") || q.contains("won") {
            stage_filter(pipeline, &[WON_STAGE])
        } else {
            pipeline.clone()
        }
    }

    pub fn products(&self) -> Table {
        self.store.products().clone()
    }

    /// Won deals.
    pub fn best_deals(&self) -> Table {
        stage_filter(self.store.pipeline(), &[WON_STAGE])
    }
}

// =============================================================================
// Matching helpers
// =============================================================================

/// A distinct entity name and its lowercased form.
#[derive(Debug, Clone)]
struct Name {
    original: String,
    lower: String,
}

/// Distinct non-blank names in a column, in first-occurrence order.
fn distinct_names(table: &Table, idx: usize) -> Vec<Name> {
    let mut seen = HashSet::new();
    table
        .rows()
        .iter()
        .filter_map(|row| row[idx].as_text())
        .filter(|name| !name.trim().is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(|name| Name {
            original: name.to_string(),
            lower: name.to_lowercase(),
        })
        .collect()
}

/// Names that appear whole in the question, minus those contained in a
/// longer matched name.
fn full_name_matches<'a>(names: &'a [Name], q: &str) -> Vec<&'a Name> {
    let matched: Vec<&Name> = names.iter().filter(|n| q.contains(&n.lower)).collect();
    matched
        .iter()
        .filter(|n| {
            !matched
                .iter()
                .any(|other| other.lower.len() > n.lower.len() && other.lower.contains(&n.lower))
        })
        .copied()
        .collect()
}

/// The name whose longest token appears in the question. Ties go to the
/// earliest name.
fn best_token_match<'a>(names: &'a [Name], q: &str) -> Option<&'a Name> {
    let mut best: Option<(&Name, usize)> = None;
    for name in names {
        let score = name
            .lower
            .split_whitespace()
            .filter(|token| q.contains(*token))
            .map(|token| token.chars().count())
            .max()
            .unwrap_or(0);
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((name, score));
        }
    }
    best.map(|(name, _)| name)
}

/// The longest name appearing whole in the question. Ties go to the
/// earliest name.
fn longest_full_match(names: &[Name], q: &str) -> Option<String> {
    let mut best: Option<&Name> = None;
    for name in names.iter().filter(|n| q.contains(&n.lower)) {
        if best.map_or(true, |b| name.lower.chars().count() > b.lower.chars().count()) {
            best = Some(name);
        }
    }
    best.map(|n| n.original.clone())
}

/// Two-phase entity match on `column`: every fully named entity, else the
/// best token match.
fn entity_lookup(table: &Table, column: &str, q: &str) -> Table {
    let Some(idx) = table.column_index(column) else {
        debug!(table = table.name(), column, "Lookup column missing");
        return table.empty_like();
    };
    let names = distinct_names(table, idx);

    let full = full_name_matches(&names, q);
    let selected: HashSet<&str> = if !full.is_empty() {
        full.iter().map(|n| n.original.as_str()).collect()
    } else {
        match best_token_match(&names, q) {
            Some(name) => HashSet::from([name.original.as_str()]),
            None => return table.empty_like(),
        }
    };

    table.filter(|row| matches!(&row[idx], Value::Text(s) if selected.contains(s.as_str())))
}

/// Rows whose stage is one of `stages`, ignoring case. A table without a
/// stage column yields no rows.
fn stage_filter(table: &Table, stages: &[&str]) -> Table {
    let Some(idx) = table.column_index(STAGE_COLUMN) else {
        return table.empty_like();
    };
    table.filter(|row| {
        row[idx]
            .as_text()
            .map(|stage| stages.iter().any(|s| stage.eq_ignore_ascii_case(s)))
            .unwrap_or(false)
    })
}
