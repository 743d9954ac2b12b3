//! Total-count strategy selection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ports::{CountStrategy, FetchWindow};

/// Counting behavior requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    #[default]
    Exact,
    /// Accept a planner estimate for very large results.
    Estimate,
}

impl FromStr for CountMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "estimate" => Ok(Self::Estimate),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown count mode '{}', expected 'exact' or 'estimate'",
                other
            ))),
        }
    }
}

/// Pick how the total count of a page query is obtained.
///
/// Keyset pages never count. Offset pages count exactly unless the caller
/// asked for an estimate and an estimate threshold is configured.
pub fn choose_strategy(
    window: &FetchWindow,
    mode: CountMode,
    estimate_threshold: Option<u64>,
) -> CountStrategy {
    match (window, mode, estimate_threshold) {
        (FetchWindow::Keyset { .. }, _, _) => CountStrategy::Omitted,
        (FetchWindow::Offset { .. }, CountMode::Estimate, Some(threshold)) => {
            CountStrategy::Estimated { threshold }
        }
        (FetchWindow::Offset { .. }, _, _) => CountStrategy::Exact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PageDirection;

    const OFFSET: FetchWindow = FetchWindow::Offset {
        offset: 0,
        limit: 10,
    };

    #[test]
    fn test_offset_counts_exactly_by_default() {
        assert_eq!(choose_strategy(&OFFSET, CountMode::Exact, Some(1_000)), CountStrategy::Exact);
        // Estimation demandée mais non configurée
        assert_eq!(choose_strategy(&OFFSET, CountMode::Estimate, None), CountStrategy::Exact);
    }

    #[test]
    fn test_estimate_requires_opt_in_and_threshold() {
        assert_eq!(
            choose_strategy(&OFFSET, CountMode::Estimate, Some(1_000)),
            CountStrategy::Estimated { threshold: 1_000 }
        );
    }

    #[test]
    fn test_keyset_never_counts() {
        let keyset = FetchWindow::Keyset {
            after: None,
            direction: PageDirection::Forward,
            limit: 11,
        };
        assert_eq!(
            choose_strategy(&keyset, CountMode::Estimate, Some(1)),
            CountStrategy::Omitted
        );
        assert_eq!(choose_strategy(&keyset, CountMode::Exact, None), CountStrategy::Omitted);
    }
}
