//! Column roles and the two-tier role-to-column resolution.
//!
//! A role is a generic semantic slot (amount, date, account) that metrics
//! aggregation needs to fill with an actual column name. Resolution is
//! two-tier: a rule's own `columns_remapped` entries win, and the
//! dataset-wide [`RoleMap`] inferred at load time is the fallback. Two rules
//! in the same batch may legitimately aggregate over different columns
//! (sender vs receiver accounts), so a single global mapping is not enough.

use serde::Serialize;

use crate::rule::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Amount,
    Date,
    Account,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Amount, Role::Date, Role::Account];

    /// Substrings that mark a column name as a candidate for this role
    /// during dataset-wide inference.
    pub fn name_fragments(self) -> &'static [&'static str] {
        match self {
            Role::Amount => &["amount", "value", "amt"],
            Role::Date => &["date", "time", "timestamp"],
            Role::Account => &["account", "acct", "id"],
        }
    }

    /// Generic names the upstream mapper uses on the left-hand side of a
    /// `columns_remapped` entry for this role.
    pub fn generic_aliases(self) -> &'static [&'static str] {
        match self {
            Role::Amount => &["amount", "trans_amt", "value"],
            Role::Date => &["timestamp", "date", "time"],
            Role::Account => &["sender_account", "account", "from_acct"],
        }
    }

    pub fn matches_generic(self, generic: &str) -> bool {
        let lowered = generic.trim().to_ascii_lowercase();
        self.generic_aliases().contains(&lowered.as_str())
    }
}

/// Dataset-wide fallback assignment of at most one column per role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleMap {
    pub amount: Option<String>,
    pub date: Option<String>,
    pub account: Option<String>,
}

impl RoleMap {
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Amount => self.amount.as_deref(),
            Role::Date => self.date.as_deref(),
            Role::Account => self.account.as_deref(),
        }
    }

    pub fn set(&mut self, role: Role, column: String) {
        let slot = match role {
            Role::Amount => &mut self.amount,
            Role::Date => &mut self.date,
            Role::Account => &mut self.account,
        };
        *slot = Some(column);
    }
}

/// Resolves the column a rule should aggregate under `role`: the rule's own
/// remapping first, then the dataset-wide fallback.
pub fn resolve(role: Role, rule: &Rule, fallback: &RoleMap) -> Option<String> {
    for (generic, actual) in rule.remapped_pairs() {
        if role.matches_generic(&generic) {
            return Some(actual);
        }
    }
    fallback.get(role).map(str::to_string)
}
