//! NEB grade-point computation.
//!
//! Percentages map onto the eight NEB grade points, a subject's theory and
//! practical components are combined by credit-hour weight, and subject
//! results fold into one overall GPA. Everything here is pure arithmetic and
//! never fails: degenerate input (zero full marks, zero credit hours, no
//! subjects) produces the `0` / `NG` / `"0.00"` sentinels instead.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "NG")]
    NotGraded,
}

impl LetterGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::NotGraded => "NG",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower percentage bound (inclusive) and the grade point it earns,
/// highest band first.
const GRADE_POINT_BANDS: [(f64, f64); 7] = [
    (90.0, 4.0),
    (80.0, 3.6),
    (70.0, 3.2),
    (60.0, 2.8),
    (50.0, 2.4),
    (40.0, 2.0),
    (35.0, 1.6),
];

/// Grade point earned by `obtained` out of `full_marks`.
///
/// Zero (or non-positive) full marks yields `0.0` rather than dividing.
pub fn grade_point_for(obtained: f64, full_marks: f64) -> f64 {
    if !(full_marks > 0.0) {
        return 0.0;
    }
    let percentage = obtained / full_marks * 100.0;
    GRADE_POINT_BANDS
        .iter()
        .find(|(lower, _)| percentage >= *lower)
        .map(|(_, gp)| *gp)
        .unwrap_or(0.0)
}

/// Letter for a component grade point.
///
/// Exact match against the values `grade_point_for` produces; anything else
/// (including weighted averages such as 3.4) is `NG`. Use
/// [`final_letter_grade_for`] for credit-hour-weighted averages.
pub fn letter_grade_for(grade_point: f64) -> LetterGrade {
    match grade_point {
        gp if gp == 4.0 => LetterGrade::APlus,
        gp if gp == 3.6 => LetterGrade::A,
        gp if gp == 3.2 => LetterGrade::BPlus,
        gp if gp == 2.8 => LetterGrade::B,
        gp if gp == 2.4 => LetterGrade::CPlus,
        gp if gp == 2.0 => LetterGrade::C,
        gp if gp == 1.6 => LetterGrade::D,
        _ => LetterGrade::NotGraded,
    }
}

/// Letter for a weighted subject average.
///
/// Strict `>` thresholds, except `D` which only matches exactly 1.6. An
/// average of exactly 3.6 is therefore `A`, not `A+`.
pub fn final_letter_grade_for(weighted: f64) -> LetterGrade {
    match weighted {
        w if w > 3.6 => LetterGrade::APlus,
        w if w > 3.2 => LetterGrade::A,
        w if w > 2.8 => LetterGrade::BPlus,
        w if w > 2.4 => LetterGrade::B,
        w if w > 2.0 => LetterGrade::CPlus,
        w if w > 1.6 => LetterGrade::C,
        w if w == 1.6 => LetterGrade::D,
        _ => LetterGrade::NotGraded,
    }
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Scores for one subject, already coerced to non-negative numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMarkInput {
    pub theory_obtained: f64,
    pub theory_full_marks: f64,
    pub practical_obtained: f64,
    pub practical_full_marks: f64,
    pub theory_credit_hour: f64,
    pub practical_credit_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub obtained: f64,
    pub full_marks: f64,
    pub grade_point: f64,
    pub grade: LetterGrade,
    pub credit_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSubjectResult {
    pub grade_point: f64,
    pub grade: LetterGrade,
    pub total_credit_hour: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubjectGrades {
    pub theory: GradeResult,
    pub practical: GradeResult,
    #[serde(rename = "final")]
    pub final_result: FinalSubjectResult,
}

fn component_result(obtained: f64, full_marks: f64, credit_hour: f64) -> GradeResult {
    let grade_point = grade_point_for(obtained, full_marks);
    GradeResult {
        obtained,
        full_marks,
        grade_point,
        grade: letter_grade_for(grade_point),
        credit_hour,
    }
}

pub fn calculate_subject_grades(input: &SubjectMarkInput) -> SubjectGrades {
    let theory = component_result(
        input.theory_obtained,
        input.theory_full_marks,
        input.theory_credit_hour,
    );
    let practical = component_result(
        input.practical_obtained,
        input.practical_full_marks,
        input.practical_credit_hour,
    );

    let total_credit_hour = input.theory_credit_hour + input.practical_credit_hour;
    let final_result = if total_credit_hour > 0.0 {
        let weighted = (theory.grade_point * input.theory_credit_hour
            + practical.grade_point * input.practical_credit_hour)
            / total_credit_hour;
        FinalSubjectResult {
            grade_point: round_2_decimals(weighted),
            // The letter comes from the unrounded average.
            grade: final_letter_grade_for(weighted),
            total_credit_hour,
        }
    } else {
        FinalSubjectResult {
            grade_point: 0.0,
            grade: LetterGrade::NotGraded,
            total_credit_hour,
        }
    };

    SubjectGrades {
        theory,
        practical,
        final_result,
    }
}

/// One subject's contribution to the overall GPA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaEntry {
    pub total_credit_hour: f64,
    pub grade_point: f64,
}

/// Ungraded or absent subjects (zero grade point) and zero-credit subjects
/// are left out of both the weighted sum and the credit total.
pub fn counts_toward_gpa(entry: &GpaEntry) -> bool {
    entry.total_credit_hour > 0.0 && entry.grade_point > 0.0
}

/// Credit-hour-weighted mean of the counted entries, formatted to exactly
/// two decimals. `"0.00"` when nothing counts.
pub fn calculate_overall_gpa<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a GpaEntry>,
{
    let (sum_weighted, sum_credits) = entries
        .into_iter()
        .filter(|e| counts_toward_gpa(e))
        .fold((0.0_f64, 0.0_f64), |(weighted, credits), e| {
            (
                weighted + e.grade_point * e.total_credit_hour,
                credits + e.total_credit_hour,
            )
        });

    if sum_credits > 0.0 {
        format!("{:.2}", sum_weighted / sum_credits)
    } else {
        "0.00".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(t: f64, tf: f64, p: f64, pf: f64, tch: f64, pch: f64) -> SubjectMarkInput {
        SubjectMarkInput {
            theory_obtained: t,
            theory_full_marks: tf,
            practical_obtained: p,
            practical_full_marks: pf,
            theory_credit_hour: tch,
            practical_credit_hour: pch,
        }
    }

    #[test]
    fn zero_full_marks_never_divides() {
        assert_eq!(grade_point_for(50.0, 0.0), 0.0);
        assert_eq!(grade_point_for(0.0, 0.0), 0.0);
        assert_eq!(grade_point_for(1000.0, 0.0), 0.0);
    }

    #[test]
    fn grade_point_bands_are_inclusive_at_lower_bound() {
        assert_eq!(grade_point_for(90.0, 100.0), 4.0);
        assert_eq!(grade_point_for(89.99, 100.0), 3.6);
        assert_eq!(grade_point_for(80.0, 100.0), 3.6);
        assert_eq!(grade_point_for(70.0, 100.0), 3.2);
        assert_eq!(grade_point_for(60.0, 100.0), 2.8);
        assert_eq!(grade_point_for(50.0, 100.0), 2.4);
        assert_eq!(grade_point_for(40.0, 100.0), 2.0);
        assert_eq!(grade_point_for(35.0, 100.0), 1.6);
        assert_eq!(grade_point_for(34.99, 100.0), 0.0);
        assert_eq!(grade_point_for(0.0, 100.0), 0.0);
        // Percentages, not raw marks.
        assert_eq!(grade_point_for(45.0, 50.0), 4.0);
        assert_eq!(grade_point_for(18.0, 25.0), 3.2);
    }

    #[test]
    fn letter_grade_is_exact_match_only() {
        assert_eq!(letter_grade_for(4.0), LetterGrade::APlus);
        assert_eq!(letter_grade_for(3.6), LetterGrade::A);
        assert_eq!(letter_grade_for(3.2), LetterGrade::BPlus);
        assert_eq!(letter_grade_for(2.8), LetterGrade::B);
        assert_eq!(letter_grade_for(2.4), LetterGrade::CPlus);
        assert_eq!(letter_grade_for(2.0), LetterGrade::C);
        assert_eq!(letter_grade_for(1.6), LetterGrade::D);
        assert_eq!(letter_grade_for(0.0), LetterGrade::NotGraded);
        assert_eq!(letter_grade_for(3.59), LetterGrade::NotGraded);
        assert_eq!(letter_grade_for(3.4), LetterGrade::NotGraded);
    }

    #[test]
    fn final_letter_uses_strict_thresholds() {
        assert_eq!(final_letter_grade_for(4.0), LetterGrade::APlus);
        assert_eq!(final_letter_grade_for(3.61), LetterGrade::APlus);
        assert_eq!(final_letter_grade_for(3.6), LetterGrade::A);
        assert_eq!(final_letter_grade_for(3.4), LetterGrade::A);
        assert_eq!(final_letter_grade_for(3.2), LetterGrade::BPlus);
        assert_eq!(final_letter_grade_for(2.8), LetterGrade::B);
        assert_eq!(final_letter_grade_for(2.4), LetterGrade::CPlus);
        assert_eq!(final_letter_grade_for(2.0), LetterGrade::C);
        assert_eq!(final_letter_grade_for(1.7), LetterGrade::C);
        assert_eq!(final_letter_grade_for(1.6), LetterGrade::D);
        assert_eq!(final_letter_grade_for(1.59), LetterGrade::NotGraded);
        assert_eq!(final_letter_grade_for(0.0), LetterGrade::NotGraded);
    }

    #[test]
    fn full_marks_in_both_components_is_a_plus() {
        let out = calculate_subject_grades(&input(90.0, 100.0, 90.0, 100.0, 3.0, 1.0));
        assert_eq!(out.theory.grade_point, 4.0);
        assert_eq!(out.theory.grade, LetterGrade::APlus);
        assert_eq!(out.practical.grade_point, 4.0);
        assert_eq!(out.practical.grade, LetterGrade::APlus);
        assert_eq!(out.final_result.grade_point, 4.0);
        assert_eq!(out.final_result.grade, LetterGrade::APlus);
        assert_eq!(out.final_result.total_credit_hour, 4.0);
    }

    #[test]
    fn weighted_average_of_exactly_3_6_is_a() {
        let out = calculate_subject_grades(&input(85.0, 100.0, 40.0, 50.0, 1.0, 1.0));
        assert_eq!(out.theory.grade_point, 3.6);
        assert_eq!(out.practical.grade_point, 3.6);
        assert_eq!(out.final_result.grade_point, 3.6);
        assert_eq!(out.final_result.grade, LetterGrade::A);
    }

    #[test]
    fn weighted_average_of_exactly_1_6_is_d() {
        let out = calculate_subject_grades(&input(36.0, 100.0, 9.0, 25.0, 1.0, 1.0));
        assert_eq!(out.theory.grade_point, 1.6);
        assert_eq!(out.practical.grade_point, 1.6);
        assert_eq!(out.final_result.grade, LetterGrade::D);
    }

    #[test]
    fn non_enumerated_average_gets_range_letter_but_components_stay_exact() {
        // 4.0 theory / 2.8 practical at 1:1 -> 3.4
        let out = calculate_subject_grades(&input(95.0, 100.0, 15.0, 25.0, 1.0, 1.0));
        assert_eq!(out.final_result.grade_point, 3.4);
        assert_eq!(out.final_result.grade, LetterGrade::A);
        assert_eq!(letter_grade_for(out.final_result.grade_point), LetterGrade::NotGraded);
    }

    #[test]
    fn final_grade_point_is_rounded_to_two_decimals() {
        // (3.2*3 + 2.4*2) / 5 = 2.88
        let out = calculate_subject_grades(&input(75.0, 100.0, 13.0, 25.0, 3.0, 2.0));
        assert_eq!(out.final_result.grade_point, 2.88);
        assert_eq!(out.final_result.grade, LetterGrade::BPlus);

        // (4.0*2 + 3.6*1) / 3 = 3.8666...
        let out = calculate_subject_grades(&input(92.0, 100.0, 21.0, 25.0, 2.0, 1.0));
        assert_eq!(out.final_result.grade_point, 3.87);
        assert_eq!(out.final_result.grade, LetterGrade::APlus);
    }

    #[test]
    fn zero_credit_hours_degrade_to_ng() {
        let out = calculate_subject_grades(&input(90.0, 100.0, 25.0, 25.0, 0.0, 0.0));
        assert_eq!(out.theory.grade, LetterGrade::APlus);
        assert_eq!(out.final_result.grade_point, 0.0);
        assert_eq!(out.final_result.grade, LetterGrade::NotGraded);
        assert_eq!(out.final_result.total_credit_hour, 0.0);
    }

    #[test]
    fn theory_only_subject_ignores_practical() {
        let out = calculate_subject_grades(&input(72.0, 100.0, 0.0, 0.0, 4.0, 0.0));
        assert_eq!(out.practical.grade_point, 0.0);
        assert_eq!(out.practical.grade, LetterGrade::NotGraded);
        assert_eq!(out.final_result.grade_point, 3.2);
        assert_eq!(out.final_result.grade, LetterGrade::BPlus);
    }

    #[test]
    fn subject_calculation_is_repeatable() {
        let i = input(67.5, 75.0, 19.0, 25.0, 3.0, 1.0);
        let a = calculate_subject_grades(&i);
        let b = calculate_subject_grades(&i);
        assert_eq!(a, b);
        assert_eq!(
            a.final_result.grade_point.to_bits(),
            b.final_result.grade_point.to_bits()
        );
    }

    #[test]
    fn overall_gpa_of_nothing_is_zero() {
        let empty: Vec<GpaEntry> = Vec::new();
        assert_eq!(calculate_overall_gpa(&empty), "0.00");
    }

    #[test]
    fn overall_gpa_excludes_ungraded_subjects() {
        let entries = [
            GpaEntry {
                total_credit_hour: 4.0,
                grade_point: 4.0,
            },
            GpaEntry {
                total_credit_hour: 2.0,
                grade_point: 0.0,
            },
        ];
        assert_eq!(calculate_overall_gpa(&entries), "4.00");
    }

    #[test]
    fn overall_gpa_weights_by_credit_hour() {
        let entries = [
            GpaEntry {
                total_credit_hour: 4.0,
                grade_point: 4.0,
            },
            GpaEntry {
                total_credit_hour: 4.0,
                grade_point: 2.0,
            },
        ];
        assert_eq!(calculate_overall_gpa(&entries), "3.00");

        let entries = [
            GpaEntry {
                total_credit_hour: 5.0,
                grade_point: 3.6,
            },
            GpaEntry {
                total_credit_hour: 3.0,
                grade_point: 2.4,
            },
        ];
        // (18 + 7.2) / 8 = 3.15
        assert_eq!(calculate_overall_gpa(&entries), "3.15");
    }

    #[test]
    fn overall_gpa_with_only_zero_credit_subjects_is_zero() {
        let entries = [
            GpaEntry {
                total_credit_hour: 0.0,
                grade_point: 4.0,
            },
            GpaEntry {
                total_credit_hour: 0.0,
                grade_point: 3.2,
            },
        ];
        assert_eq!(calculate_overall_gpa(&entries), "0.00");
    }

    #[test]
    fn letter_grades_serialize_as_neb_strings() {
        let v = serde_json::to_value(LetterGrade::CPlus).expect("serialize");
        assert_eq!(v, serde_json::json!("C+"));
        let v = serde_json::to_value(LetterGrade::NotGraded).expect("serialize");
        assert_eq!(v, serde_json::json!("NG"));
        assert_eq!(LetterGrade::APlus.to_string(), "A+");
        assert_eq!(LetterGrade::BPlus.as_str(), "B+");
    }
}
