//! Sequential question-number validation
//!
//! Tracks the next expected number inside the current tour and across the
//! whole package. Whether numbers restart per tour is unknown until the first
//! tour boundary where it matters; from then on the scheme is locked and every
//! number must fit it. A number that doesn't fit is not a question start.

use crate::models::{NumberingMode, TourType};

/// Question heading style; the first question of a tour locks it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionFormat {
    /// "Запитання 7"
    Named,
    /// "7."
    Numbered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Unknown,
    PerTour,
    Global,
}

#[derive(Debug)]
pub struct NumberingValidator {
    scheme: Scheme,
    next_global: Option<u32>,
    next_in_tour: Option<u32>,
}

impl Default for NumberingValidator {
    fn default() -> Self {
        Self {
            scheme: Scheme::Unknown,
            next_global: None,
            next_in_tour: None,
        }
    }
}

fn numeric(number: &str) -> Option<u32> {
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

impl NumberingValidator {
    /// Forget the in-tour expectation; the next question opens a tour
    pub fn start_tour(&mut self) {
        self.next_in_tour = None;
    }

    /// Number the current tour expects next, regardless of scheme
    pub fn expected_in_tour(&self) -> Option<u32> {
        self.next_in_tour
    }

    /// Check whether `number` may start a question in a tour of `tour_type`
    ///
    /// Only regular tours are validated; warm-up and shoot-out tours use their
    /// own numbering. Non-numeric numbers ("5а") are always accepted.
    pub fn fits(&self, number: &str, tour_type: TourType) -> bool {
        let Some(n) = numeric(number) else {
            return true;
        };
        if tour_type != TourType::Regular {
            return true;
        }

        if let Some(expected) = self.next_in_tour {
            return n == expected;
        }

        match (self.next_global, self.scheme) {
            (None, _) => true,
            (Some(global), Scheme::Unknown) => n == global || n <= 1,
            (Some(global), Scheme::Global) => n == global,
            (Some(_), Scheme::PerTour) => n <= 1,
        }
    }

    /// Record an accepted question number
    pub fn accept(&mut self, number: &str, tour_type: TourType) {
        let Some(n) = numeric(number) else {
            return;
        };

        if tour_type == TourType::Regular {
            if self.next_in_tour.is_none() && self.scheme == Scheme::Unknown {
                if let Some(global) = self.next_global {
                    // continuing counter wins when both readings fit
                    self.scheme = if n == global {
                        Scheme::Global
                    } else {
                        Scheme::PerTour
                    };
                    tracing::debug!(scheme = ?self.scheme, "Numbering scheme resolved");
                }
            }
            self.next_global = Some(n + 1);
        }

        self.next_in_tour = Some(n + 1);
    }

    /// Mode to report for a package whose numbers are all numeric
    pub fn resolved_mode(&self) -> NumberingMode {
        match self.scheme {
            Scheme::PerTour => NumberingMode::PerTour,
            Scheme::Global | Scheme::Unknown => NumberingMode::Global,
        }
    }
}
