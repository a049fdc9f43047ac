//! `Authentication-Results` clause grading.

use tracing::debug;

const CHECKED_METHODS: [&str; 3] = ["dkim=", "spf=", "dmarc="];

/// One `dkim=`/`spf=`/`dmarc=` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AuthClause {
    pub clause: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AuthResults {
    pub clauses: Vec<AuthClause>,
}

impl AuthResults {
    /// Split on `;` and grade each checked clause by the `=pass` substring.
    pub fn parse(header: &str) -> Self {
        let clauses: Vec<AuthClause> = header
            .split(';')
            .map(str::trim)
            .filter(|f| CHECKED_METHODS.iter().any(|m| f.starts_with(m)))
            .map(|f| AuthClause {
                clause: f.to_string(),
                passed: f.contains("=pass"),
            })
            .collect();
        debug!(clauses = clauses.len(), "auth processing done");
        Self { clauses }
    }

    /// Any checked clause did not pass.
    pub fn failed(&self) -> bool {
        self.clauses.iter().any(|c| !c.passed)
    }

    pub fn lines(&self) -> Vec<String> {
        self.clauses
            .iter()
            .map(|c| {
                let grade = if c.passed { "GOOD" } else { "BAD" };
                format!("\t{grade}: {}", c.clause)
            })
            .collect()
    }
}
