use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledger_core::table::Table;

// =============================================================================
// Intent
// =============================================================================

/// Purpose of a user question; selects the retrieval routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AccountInfo,
    ContactInteraction,
    SalesHierarchy,
    ProductInfo,
    PipelineInfo,
    BestDeal,
    Followup,
    GeneralQuestion,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::AccountInfo,
        Intent::ContactInteraction,
        Intent::SalesHierarchy,
        Intent::ProductInfo,
        Intent::PipelineInfo,
        Intent::BestDeal,
        Intent::Followup,
        Intent::GeneralQuestion,
    ];

    /// The label the classifier model is asked to reply with.
    pub fn label(self) -> &'static str {
        match self {
            Intent::AccountInfo => "account_info",
            Intent::ContactInteraction => "contact_interaction",
            Intent::SalesHierarchy => "sales_hierarchy",
            Intent::ProductInfo => "product_info",
            Intent::PipelineInfo => "pipeline_info",
            Intent::BestDeal => "best_deal",
            Intent::Followup => "followup",
            Intent::GeneralQuestion => "general_question",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.label() == s)
            .ok_or_else(|| format!("unknown intent label: {}", s))
    }
}

// =============================================================================
// Retrieved context
// =============================================================================

/// Retrieval category; names the section a table is shown under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Accounts,
    Interactions,
    SalesTeam,
    Pipeline,
    Products,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Accounts => "accounts",
            Category::Interactions => "interactions",
            Category::SalesTeam => "sales_team",
            Category::Pipeline => "pipeline",
            Category::Products => "products",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tables retrieved for one question, in retrieval order.
///
/// An empty table is a valid "nothing matched" result, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    sections: Vec<(Category, Table)>,
}

impl RetrievedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: Category, table: Table) {
        self.sections.push((category, table));
    }

    pub fn get(&self, category: Category) -> Option<&Table> {
        self.sections
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, t)| t)
    }

    pub fn sections(&self) -> &[(Category, Table)] {
        &self.sections
    }

    /// Sections with at least one row.
    pub fn non_empty(&self) -> impl Iterator<Item = &(Category, Table)> {
        self.sections.iter().filter(|(_, t)| !t.is_empty())
    }

    /// True when no section holds any rows.
    pub fn has_no_rows(&self) -> bool {
        self.non_empty().next().is_none()
    }

    pub fn total_rows(&self) -> usize {
        self.sections.iter().map(|(_, t)| t.len()).sum()
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Outcome of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// Answer text (Markdown).
    pub answer: String,
    /// Intent the question was routed by.
    pub intent: Intent,
    pub session_id: Uuid,
}
