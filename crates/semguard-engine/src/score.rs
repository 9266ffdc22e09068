//! Compliance score

use semguard_core::{Diagnostic, Severity};

pub const MAX_SCORE: u32 = 100;
pub const ERROR_PENALTY: u32 = 10;
pub const WARN_PENALTY: u32 = 2;

/// Score a project: 100 minus 10 per active error and 2 per active
/// warning, never below 0. Suppressed diagnostics and info cost nothing.
pub fn score(diagnostics: &[Diagnostic]) -> u32 {
    let penalty = diagnostics
        .iter()
        .filter(|d| !d.suppressed)
        .map(|d| match d.severity {
            Severity::Error => ERROR_PENALTY,
            Severity::Warn => WARN_PENALTY,
            Severity::Info => 0,
        })
        .fold(0u32, u32::saturating_add);

    MAX_SCORE.saturating_sub(penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semguard_core::DiagnosticCode;

    fn findings(errors: usize, warnings: usize) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        diagnostics.extend((0..errors).map(|_| Diagnostic::for_code(DiagnosticCode::ManyToMany, "m2m")));
        diagnostics.extend((0..warnings).map(|_| Diagnostic::for_code(DiagnosticCode::UnusedMeasures, "unused")));
        diagnostics
    }

    #[test]
    fn penalties() {
        assert_eq!(score(&[]), 100);
        assert_eq!(score(&findings(1, 3)), 84);
        assert_eq!(score(&findings(0, 3)), 94);
        assert_eq!(score(&findings(11, 0)), 0);
    }

    #[test]
    fn info_and_suppressed_are_free() {
        let mut diagnostics = findings(1, 1);
        diagnostics[0].suppress("allowed");
        diagnostics.push(Diagnostic::new(DiagnosticCode::NamingConvention, Severity::Info, "style"));
        assert_eq!(score(&diagnostics), 98);
    }

    #[test]
    fn order_independent_and_idempotent() {
        let mut diagnostics = findings(2, 5);
        let first = score(&diagnostics);
        diagnostics.reverse();
        assert_eq!(score(&diagnostics), first);
        assert_eq!(score(&diagnostics), first);
    }

    #[test]
    fn suppressing_never_lowers_score() {
        let mut diagnostics = findings(3, 4);
        let mut previous = score(&diagnostics);
        for i in 0..diagnostics.len() {
            diagnostics[i].suppress("allowed");
            let current = score(&diagnostics);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(previous, 100);
    }
}
