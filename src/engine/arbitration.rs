//! Winner selection over one cycle's analyzer outcomes.
//!
//! Pure function of its input: no I/O, no clock, no randomness.

use crate::error::{AnalyzerError, Dropout, IgnitionError};
use crate::judgment::Judgment;

/// Result of arbitrating one cycle.
#[derive(Debug, Clone)]
pub struct Arbitration {
    /// Position of the winner within `judgments`.
    pub winner: usize,
    /// Validated judgments in registration order.
    pub judgments: Vec<Judgment>,
    /// Analyzers that failed or produced an invalid judgment.
    pub dropouts: Vec<Dropout>,
}

impl Arbitration {
    pub fn winner(&self) -> &Judgment {
        &self.judgments[self.winner]
    }
}

/// Validate `outcomes` and select the winner.
///
/// `outcomes` must be in registration order, one per analyzer, paired with
/// the analyzer id. Failed calls, judgments that fail validation and
/// judgments whose source is not the registering analyzer become dropouts. The winner has the highest priority; ties go to the earliest
/// registered analyzer.
pub fn arbitrate<I>(outcomes: I) -> Result<Arbitration, IgnitionError>
where
    I: IntoIterator<Item = (String, Result<Judgment, AnalyzerError>)>,
{
    let mut judgments = Vec::new();
    let mut dropouts = Vec::new();

    for (analyzer, outcome) in outcomes {
        match outcome {
            Ok(judgment) if judgment.source() != analyzer => {
                log::warn!(
                    "discarding judgment from '{}': attributed to '{}'",
                    analyzer,
                    judgment.source()
                );
                dropouts.push(Dropout {
                    reason: format!("judgment attributed to '{}'", judgment.source()),
                    analyzer,
                });
            }
            Ok(judgment) => match judgment.validate() {
                Ok(()) => judgments.push(judgment),
                Err(invalid) => {
                    log::warn!("discarding judgment from '{}': {}", analyzer, invalid);
                    dropouts.push(Dropout {
                        analyzer,
                        reason: invalid.to_string(),
                    });
                }
            },
            Err(err) => {
                log::warn!("analyzer '{}' failed: {}", analyzer, err);
                dropouts.push(Dropout {
                    analyzer,
                    reason: err.to_string(),
                });
            }
        }
    }

    // Strict comparison keeps the earliest index on ties.
    let mut winner: Option<usize> = None;
    for (index, judgment) in judgments.iter().enumerate() {
        match winner {
            Some(best) if judgments[best].priority() >= judgment.priority() => {}
            _ => winner = Some(index),
        }
    }

    match winner {
        Some(winner) => Ok(Arbitration {
            winner,
            judgments,
            dropouts,
        }),
        None => Err(IgnitionError::NoViableJudgment { dropouts }),
    }
}
