//! Strategy selection policies used by the SCAN stage

use crate::config::SelectionPolicy;

use super::StrategyDescriptor;

/// Picks the strategy to act on from the approved list
pub trait StrategySelector: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(&self, approved: &'a [StrategyDescriptor]) -> Option<&'a StrategyDescriptor>;
}

/// First entry in file order
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstMatch;

impl StrategySelector for FirstMatch {
    fn name(&self) -> &'static str {
        "first-match"
    }

    fn select<'a>(&self, approved: &'a [StrategyDescriptor]) -> Option<&'a StrategyDescriptor> {
        approved.first()
    }
}

/// Highest validation score; ties keep file order, unscored entries rank last
#[derive(Debug, Default, Clone, Copy)]
pub struct BestScore;

impl StrategySelector for BestScore {
    fn name(&self) -> &'static str {
        "best-score"
    }

    fn select<'a>(&self, approved: &'a [StrategyDescriptor]) -> Option<&'a StrategyDescriptor> {
        let mut best: Option<&StrategyDescriptor> = None;
        for candidate in approved {
            let score = candidate.score().unwrap_or(f64::NEG_INFINITY);
            match best {
                Some(b) if b.score().unwrap_or(f64::NEG_INFINITY) >= score => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

pub fn selector_for(policy: SelectionPolicy) -> Box<dyn StrategySelector> {
    match policy {
        SelectionPolicy::FirstMatch => Box::new(FirstMatch),
        SelectionPolicy::BestScore => Box::new(BestScore),
    }
}
