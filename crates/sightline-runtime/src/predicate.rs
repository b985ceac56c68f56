use rayon::prelude::*;
use sightline_graph::{Check, Predicate, TaskGraph};
use sightline_vision::{Frame, MatchCandidate, RecognizeError, RecognizerSet};

use crate::context::PredicateResult;

/// Result of evaluating a predicate that could be answered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
  /// Carries the most confident candidate among the checks that passed, if any ran.
  Satisfied(Option<MatchCandidate>),
  Unsatisfied,
}

/// Why a predicate could not be answered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalError {
  Unavailable(String),
  Configuration(String),
}

impl Outcome {
  pub fn is_satisfied(&self) -> bool {
    matches!(self, Outcome::Satisfied(_))
  }

  pub fn best(&self) -> Option<&MatchCandidate> {
    match self {
      Outcome::Satisfied(best) => best.as_ref(),
      Outcome::Unsatisfied => None,
    }
  }

  pub fn into_trace(self) -> PredicateResult {
    match self {
      Outcome::Satisfied(best) => PredicateResult::Satisfied { best },
      Outcome::Unsatisfied => PredicateResult::Unsatisfied,
    }
  }
}

impl EvalError {
  pub fn to_trace(&self) -> PredicateResult {
    match self {
      EvalError::Unavailable(message) => PredicateResult::Unavailable {
        message: message.clone(),
      },
      EvalError::Configuration(message) => PredicateResult::Error {
        message: message.clone(),
      },
    }
  }
}

impl From<RecognizeError> for EvalError {
  fn from(err: RecognizeError) -> Self {
    if err.is_unavailable() {
      EvalError::Unavailable(err.to_string())
    } else {
      EvalError::Configuration(err.to_string())
    }
  }
}

/// Evaluates predicates of one graph against frames.
pub(crate) struct Evaluator<'a> {
  pub graph: &'a TaskGraph,
  pub recognizers: &'a RecognizerSet,
}

impl Evaluator<'_> {
  /// `all` is a logical AND and `any` a logical OR. Branches of a group are
  /// evaluated in parallel and every branch finishes before the decision.
  ///
  /// A configuration error in any branch always wins. In `all`, an
  /// unavailable branch makes the group unavailable. In `any`, a satisfied
  /// branch decides the group even when a sibling is unavailable, so a
  /// missing text backend only degrades a group to its other strategies.
  pub fn evaluate(&self, frame: &Frame, predicate: &Predicate) -> Result<Outcome, EvalError> {
    match predicate {
      Predicate::Always => Ok(Outcome::Satisfied(None)),
      Predicate::Check(check) => self.check(frame, check),
      Predicate::All(branches) => {
        let (outcomes, unavailable) = self.branches(frame, branches)?;
        if let Some(err) = unavailable {
          return Err(err);
        }
        if outcomes.iter().all(Outcome::is_satisfied) {
          Ok(Outcome::Satisfied(most_confident(&outcomes)))
        } else {
          Ok(Outcome::Unsatisfied)
        }
      }
      Predicate::Any(branches) => {
        let (outcomes, unavailable) = self.branches(frame, branches)?;
        if outcomes.iter().any(Outcome::is_satisfied) {
          return Ok(Outcome::Satisfied(most_confident(&outcomes)));
        }
        match unavailable {
          Some(err) => Err(err),
          None => Ok(Outcome::Unsatisfied),
        }
      }
    }
  }

  /// Answered branches plus the first unavailability, if any.
  fn branches(
    &self,
    frame: &Frame,
    branches: &[Predicate],
  ) -> Result<(Vec<Outcome>, Option<EvalError>), EvalError> {
    let results: Vec<Result<Outcome, EvalError>> = branches
      .par_iter()
      .map(|branch| self.evaluate(frame, branch))
      .collect();

    let mut unavailable = None;
    let mut outcomes = Vec::with_capacity(results.len());
    for result in results {
      match result {
        Ok(outcome) => outcomes.push(outcome),
        Err(err @ EvalError::Configuration(_)) => return Err(err),
        Err(err @ EvalError::Unavailable(_)) => {
          unavailable.get_or_insert(err);
        }
      }
    }
    Ok((outcomes, unavailable))
  }

  fn check(&self, frame: &Frame, check: &Check) -> Result<Outcome, EvalError> {
    let region = self
      .graph
      .frame_region(check.region.as_ref(), frame.resolution());
    let candidates = self
      .recognizers
      .evaluate(frame, &check.recognizer, &region, check.threshold)?;

    Ok(match candidates.into_iter().next() {
      Some(best) => Outcome::Satisfied(Some(best)),
      None => Outcome::Unsatisfied,
    })
  }
}

fn most_confident(outcomes: &[Outcome]) -> Option<MatchCandidate> {
  outcomes
    .iter()
    .filter_map(Outcome::best)
    .fold(None, |best: Option<&MatchCandidate>, candidate| match best {
      Some(current) if current.confidence >= candidate.confidence => Some(current),
      _ => Some(candidate),
    })
    .cloned()
}
