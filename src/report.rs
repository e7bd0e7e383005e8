use crate::grading::{self, FinalSubjectResult, GpaEntry, GradeResult, SubjectMarkInput};
use log::debug;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ReportError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub roll_no: Option<String>,
    pub class_name: String,
    pub faculty: Option<String>,
    pub academic_year_id: Option<String>,
    pub dob_bs: Option<String>,
    pub dob_ad: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub id: String,
    pub name: String,
    pub academic_year_id: Option<String>,
    pub exam_date_bs: Option<String>,
    pub exam_date_ad: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMeta {
    pub subject_id: String,
    pub name: String,
    pub theory_code: Option<String>,
    pub practical_code: Option<String>,
}

/// Coerces a stored cell to a usable mark or weight.
///
/// NULL, unparsable text, blobs, non-finite and negative values all become
/// `0.0`. This is the only place loosely typed storage turns into numbers.
pub fn coerce_number(v: &Value) -> f64 {
    let n = match v {
        Value::Null | Value::Blob(_) => 0.0,
        Value::Integer(i) => *i as f64,
        Value::Real(f) => *f,
        Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
    };
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

/// One subject's stored marks for a student, coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectMarksRow {
    pub subject: SubjectMeta,
    pub marks: SubjectMarkInput,
}

impl SubjectMarksRow {
    /// Raw cells in the order: theory obtained, practical obtained, theory
    /// full marks, practical full marks, theory credit hour, practical
    /// credit hour.
    pub fn from_raw(subject: SubjectMeta, raw: [&Value; 6]) -> Self {
        let [to, po, tf, pf, tch, pch] = raw;
        Self {
            subject,
            marks: SubjectMarkInput {
                theory_obtained: coerce_number(to),
                practical_obtained: coerce_number(po),
                theory_full_marks: coerce_number(tf),
                practical_full_marks: coerce_number(pf),
                theory_credit_hour: coerce_number(tch),
                practical_credit_hour: coerce_number(pch),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectReportLine {
    #[serde(flatten)]
    pub subject: SubjectMeta,
    pub theory: GradeResult,
    pub practical: GradeResult,
    #[serde(rename = "final")]
    pub final_result: FinalSubjectResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: StudentRecord,
    pub exam: ExamRecord,
    pub subjects: Vec<SubjectReportLine>,
    /// Always two decimals, e.g. `"3.45"`.
    pub overall_gpa: String,
}

pub fn assemble_student_report(
    student: StudentRecord,
    exam: ExamRecord,
    rows: Vec<SubjectMarksRow>,
) -> StudentReport {
    let subjects: Vec<SubjectReportLine> = rows
        .into_iter()
        .map(|row| {
            let grades = grading::calculate_subject_grades(&row.marks);
            SubjectReportLine {
                subject: row.subject,
                theory: grades.theory,
                practical: grades.practical,
                final_result: grades.final_result,
            }
        })
        .collect();

    let gpa_entries: Vec<GpaEntry> = subjects
        .iter()
        .map(|line| GpaEntry {
            total_credit_hour: line.final_result.total_credit_hour,
            grade_point: line.final_result.grade_point,
        })
        .collect();
    let overall_gpa = grading::calculate_overall_gpa(&gpa_entries);

    StudentReport {
        student,
        exam,
        subjects,
        overall_gpa,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFilters {
    pub class_name: Option<String>,
    pub faculty: Option<String>,
    pub academic_year_id: Option<String>,
}

fn optional_filter_str(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<String>, ReportError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(ReportError::new(
                    "bad_params",
                    format!("filters.{} must be string or null", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn parse_batch_filters(raw: Option<&serde_json::Value>) -> Result<BatchFilters, ReportError> {
    let Some(raw) = raw else {
        return Ok(BatchFilters::default());
    };
    if raw.is_null() {
        return Ok(BatchFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(ReportError::new("bad_params", "filters must be an object"));
    };
    Ok(BatchFilters {
        class_name: optional_filter_str(obj, "className")?,
        faculty: optional_filter_str(obj, "faculty")?,
        academic_year_id: optional_filter_str(obj, "academicYearId")?,
    })
}

const STUDENT_COLUMNS: &str = "id, first_name, last_name, roll_no, class_name, faculty,
     academic_year_id, dob_bs, dob_ad";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        roll_no: r.get(3)?,
        class_name: r.get(4)?,
        faculty: r.get(5)?,
        academic_year_id: r.get(6)?,
        dob_bs: r.get(7)?,
        dob_ad: r.get(8)?,
    })
}

fn load_exam(conn: &Connection, exam_id: &str) -> Result<ExamRecord, ReportError> {
    conn.query_row(
        "SELECT id, name, academic_year_id, exam_date_bs, exam_date_ad
         FROM exams
         WHERE id = ?",
        [exam_id],
        |r| {
            Ok(ExamRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                academic_year_id: r.get(2)?,
                exam_date_bs: r.get(3)?,
                exam_date_ad: r.get(4)?,
            })
        },
    )
    .optional()
    .map_err(ReportError::query)?
    .ok_or_else(|| ReportError::new("not_found", "exam not found"))
}

/// `WHERE` clause over `students` plus its bound values. Used both to list
/// students and, as a subquery, to pick their marks rows.
struct StudentScope {
    where_sql: String,
    bind_values: Vec<Value>,
}

impl StudentScope {
    fn single(student_id: &str) -> Self {
        Self {
            where_sql: "WHERE id = ?".to_string(),
            bind_values: vec![Value::Text(student_id.to_string())],
        }
    }

    fn from_filters(filters: &BatchFilters) -> Self {
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(class_name) = &filters.class_name {
            clauses.push("class_name = ?");
            bind_values.push(Value::Text(class_name.clone()));
        }
        if let Some(faculty) = &filters.faculty {
            clauses.push("faculty = ?");
            bind_values.push(Value::Text(faculty.clone()));
        }
        if let Some(year) = &filters.academic_year_id {
            clauses.push("academic_year_id = ?");
            bind_values.push(Value::Text(year.clone()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        Self {
            where_sql,
            bind_values,
        }
    }
}

/// Marks rows joined with their subject, keyed by student id, in subject
/// sort order.
fn load_marks_rows(
    conn: &Connection,
    exam_id: &str,
    scope: &StudentScope,
) -> Result<HashMap<String, Vec<SubjectMarksRow>>, ReportError> {
    let sql = format!(
        "SELECT m.student_id, s.id, s.name, s.theory_code, s.practical_code,
                m.theory_obtained, m.practical_obtained,
                s.theory_full_marks, s.practical_full_marks,
                s.theory_credit_hour, s.practical_credit_hour
         FROM marks m
         JOIN subjects s ON s.id = m.subject_id
         WHERE m.exam_id = ?
           AND m.student_id IN (SELECT id FROM students {})
         ORDER BY s.sort_order, s.name",
        scope.where_sql
    );
    let mut bind_values: Vec<Value> = Vec::with_capacity(scope.bind_values.len() + 1);
    bind_values.push(Value::Text(exam_id.to_string()));
    bind_values.extend(scope.bind_values.iter().cloned());

    let mut by_student: HashMap<String, Vec<SubjectMarksRow>> = HashMap::new();
    let mut stmt = conn.prepare(&sql).map_err(ReportError::query)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), |r| {
            let student_id: String = r.get(0)?;
            let subject = SubjectMeta {
                subject_id: r.get(1)?,
                name: r.get(2)?,
                theory_code: r.get(3)?,
                practical_code: r.get(4)?,
            };
            let raw: [Value; 6] = [
                r.get(5)?,
                r.get(6)?,
                r.get(7)?,
                r.get(8)?,
                r.get(9)?,
                r.get(10)?,
            ];
            let [a, b, c, d, e, f] = &raw;
            Ok((student_id, SubjectMarksRow::from_raw(subject, [a, b, c, d, e, f])))
        })
        .map_err(ReportError::query)?;
    for row in rows {
        let (student_id, marks_row) = row.map_err(ReportError::query)?;
        by_student.entry(student_id).or_default().push(marks_row);
    }
    Ok(by_student)
}

pub fn load_student_report(
    conn: &Connection,
    student_id: &str,
    exam_id: &str,
) -> Result<StudentReport, ReportError> {
    let scope = StudentScope::single(student_id);
    let sql = format!("SELECT {} FROM students {}", STUDENT_COLUMNS, scope.where_sql);
    let student = conn
        .query_row(&sql, params_from_iter(scope.bind_values.iter()), student_from_row)
        .optional()
        .map_err(ReportError::query)?
        .ok_or_else(|| ReportError::new("not_found", "student not found"))?;
    let exam = load_exam(conn, exam_id)?;

    let mut rows = load_marks_rows(conn, exam_id, &scope)?;
    let rows = rows.remove(&student.id).unwrap_or_default();
    debug!(
        "event=report_student module=report status=ok subjects={}",
        rows.len()
    );
    Ok(assemble_student_report(student, exam, rows))
}

/// Reports for every student matching `filters`, ordered by class, sort
/// order and roll number (numeric first). Students with no marks still get
/// a report.
pub fn load_batch_reports(
    conn: &Connection,
    exam_id: &str,
    filters: &BatchFilters,
) -> Result<Vec<StudentReport>, ReportError> {
    let exam = load_exam(conn, exam_id)?;

    let scope = StudentScope::from_filters(filters);
    let sql = format!(
        "SELECT {} FROM students {}
         ORDER BY class_name, sort_order, CAST(roll_no AS INTEGER), roll_no",
        STUDENT_COLUMNS, scope.where_sql
    );

    let mut stmt = conn.prepare(&sql).map_err(ReportError::query)?;
    let students: Vec<StudentRecord> = stmt
        .query_map(params_from_iter(scope.bind_values.iter()), student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(ReportError::query)?;

    let mut rows_by_student = load_marks_rows(conn, exam_id, &scope)?;

    let reports: Vec<StudentReport> = students
        .into_iter()
        .map(|student| {
            let rows = rows_by_student.remove(&student.id).unwrap_or_default();
            assemble_student_report(student, exam.clone(), rows)
        })
        .collect();
    debug!(
        "event=report_batch module=report status=ok students={}",
        reports.len()
    );
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::LetterGrade;

    fn student() -> StudentRecord {
        StudentRecord {
            id: "s1".into(),
            first_name: "Asha".into(),
            last_name: "Karki".into(),
            roll_no: Some("7".into()),
            class_name: "11".into(),
            faculty: Some("Science".into()),
            academic_year_id: None,
            dob_bs: None,
            dob_ad: None,
        }
    }

    fn exam() -> ExamRecord {
        ExamRecord {
            id: "e1".into(),
            name: "Final".into(),
            academic_year_id: None,
            exam_date_bs: None,
            exam_date_ad: None,
        }
    }

    fn meta(id: &str) -> SubjectMeta {
        SubjectMeta {
            subject_id: id.into(),
            name: id.to_uppercase(),
            theory_code: Some(format!("{}-T", id)),
            practical_code: None,
        }
    }

    fn row(id: &str, marks: SubjectMarkInput) -> SubjectMarksRow {
        SubjectMarksRow {
            subject: meta(id),
            marks,
        }
    }

    #[test]
    fn coerce_number_defaults_to_zero() {
        assert_eq!(coerce_number(&Value::Null), 0.0);
        assert_eq!(coerce_number(&Value::Integer(45)), 45.0);
        assert_eq!(coerce_number(&Value::Real(22.5)), 22.5);
        assert_eq!(coerce_number(&Value::Text(" 67.5 ".into())), 67.5);
        assert_eq!(coerce_number(&Value::Text("abs".into())), 0.0);
        assert_eq!(coerce_number(&Value::Text("".into())), 0.0);
        assert_eq!(coerce_number(&Value::Text("NaN".into())), 0.0);
        assert_eq!(coerce_number(&Value::Real(-3.0)), 0.0);
        assert_eq!(coerce_number(&Value::Blob(vec![1, 2])), 0.0);
    }

    #[test]
    fn from_raw_keeps_column_order() {
        let to = Value::Text("72".into());
        let po = Value::Integer(20);
        let tf = Value::Real(75.0);
        let pf = Value::Real(25.0);
        let tch = Value::Real(3.0);
        let pch = Value::Null;
        let r = SubjectMarksRow::from_raw(meta("eng"), [&to, &po, &tf, &pf, &tch, &pch]);
        assert_eq!(
            r.marks,
            SubjectMarkInput {
                theory_obtained: 72.0,
                theory_full_marks: 75.0,
                practical_obtained: 20.0,
                practical_full_marks: 25.0,
                theory_credit_hour: 3.0,
                practical_credit_hour: 0.0,
            }
        );
    }

    #[test]
    fn student_without_subjects_reports_zero_gpa() {
        let report = assemble_student_report(student(), exam(), Vec::new());
        assert!(report.subjects.is_empty());
        assert_eq!(report.overall_gpa, "0.00");
    }

    #[test]
    fn ungraded_subject_does_not_drag_gpa_down() {
        let rows = vec![
            row(
                "phy",
                SubjectMarkInput {
                    theory_obtained: 70.0,
                    theory_full_marks: 75.0,
                    practical_obtained: 24.0,
                    practical_full_marks: 25.0,
                    theory_credit_hour: 3.0,
                    practical_credit_hour: 1.0,
                },
            ),
            row(
                "nep",
                SubjectMarkInput {
                    theory_obtained: 10.0,
                    theory_full_marks: 100.0,
                    practical_obtained: 0.0,
                    practical_full_marks: 0.0,
                    theory_credit_hour: 2.0,
                    practical_credit_hour: 0.0,
                },
            ),
        ];
        let report = assemble_student_report(student(), exam(), rows);
        assert_eq!(report.subjects.len(), 2);
        assert_eq!(report.subjects[0].final_result.grade, LetterGrade::APlus);
        assert_eq!(report.subjects[1].final_result.grade, LetterGrade::NotGraded);
        assert_eq!(report.overall_gpa, "4.00");
    }

    #[test]
    fn report_json_shape_is_camel_case() {
        let rows = vec![row(
            "math",
            SubjectMarkInput {
                theory_obtained: 60.0,
                theory_full_marks: 75.0,
                practical_obtained: 20.0,
                practical_full_marks: 25.0,
                theory_credit_hour: 3.0,
                practical_credit_hour: 1.0,
            },
        )];
        let report = assemble_student_report(student(), exam(), rows);
        let v = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(v["overallGpa"], serde_json::json!("3.60"));
        assert_eq!(v["student"]["firstName"], serde_json::json!("Asha"));
        let line = &v["subjects"][0];
        assert_eq!(line["subjectId"], serde_json::json!("math"));
        assert_eq!(line["theoryCode"], serde_json::json!("math-T"));
        assert_eq!(line["theory"]["gradePoint"], serde_json::json!(3.6));
        assert_eq!(line["theory"]["grade"], serde_json::json!("A"));
        assert_eq!(line["practical"]["fullMarks"], serde_json::json!(25.0));
        assert_eq!(line["final"]["gradePoint"], serde_json::json!(3.6));
        assert_eq!(line["final"]["grade"], serde_json::json!("A"));
        assert_eq!(line["final"]["totalCreditHour"], serde_json::json!(4.0));
    }

    #[test]
    fn parse_batch_filters_treats_all_and_blank_as_unset() {
        let raw = serde_json::json!({
            "className": "ALL",
            "faculty": "  ",
            "academicYearId": "ay-1"
        });
        let f = parse_batch_filters(Some(&raw)).expect("parse filters");
        assert_eq!(f.class_name, None);
        assert_eq!(f.faculty, None);
        assert_eq!(f.academic_year_id.as_deref(), Some("ay-1"));

        assert_eq!(
            parse_batch_filters(None).expect("no filters"),
            BatchFilters::default()
        );
        let bad = serde_json::json!({ "className": 11 });
        assert_eq!(
            parse_batch_filters(Some(&bad)).expect_err("bad type").code,
            "bad_params"
        );
    }

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("{}-{}", prefix, nanos))
    }

    fn seed_class(conn: &Connection, rolls: &[(&str, i64, &str)]) {
        conn.execute(
            "INSERT INTO exams(id, name) VALUES('e1', 'Final')",
            [],
        )
        .expect("insert exam");
        conn.execute(
            "INSERT INTO subjects(id, name, class_name, theory_full_marks, theory_credit_hour, sort_order)
             VALUES('sub1', 'English', '10', 100, 4, 0)",
            [],
        )
        .expect("insert subject");
        for (id, sort_order, roll_no) in rolls {
            conn.execute(
                "INSERT INTO students(id, first_name, last_name, roll_no, class_name, sort_order)
                 VALUES(?, 'First', 'Last', ?, '10', ?)",
                (id, roll_no, sort_order),
            )
            .expect("insert student");
            conn.execute(
                "INSERT INTO marks(id, student_id, exam_id, subject_id, theory_obtained, practical_obtained)
                 VALUES(?, ?, 'e1', 'sub1', 90, 0)",
                (format!("m-{}", id), id),
            )
            .expect("insert marks");
        }
    }

    #[test]
    fn batch_orders_equal_sort_order_by_numeric_roll() {
        let ws = temp_workspace("schoold-report-roll-order");
        let conn = crate::db::open_db(&ws).expect("open db");
        seed_class(&conn, &[("a", 0, "10"), ("b", 0, "2"), ("c", 0, "1")]);

        let reports =
            load_batch_reports(&conn, "e1", &BatchFilters::default()).expect("batch reports");
        let ids: Vec<&str> = reports.iter().map(|r| r.student.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        drop(conn);
        let _ = std::fs::remove_dir_all(&ws);
    }

    #[test]
    fn batch_marks_lookup_does_not_bind_one_variable_per_student() {
        let ws = temp_workspace("schoold-report-var-limit");
        let conn = crate::db::open_db(&ws).expect("open db");
        let ids: Vec<String> = (0..12).map(|i| format!("s{:02}", i)).collect();
        let rolls: Vec<(&str, i64, &str)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i as i64, ""))
            .collect();
        seed_class(&conn, &rolls);

        // Far fewer variables than students.
        let _ = conn.set_limit(rusqlite::limits::Limit::SQLITE_LIMIT_VARIABLE_NUMBER, 4);
        let filters = BatchFilters {
            class_name: Some("10".into()),
            ..BatchFilters::default()
        };
        let reports = load_batch_reports(&conn, "e1", &filters).expect("batch reports");
        assert_eq!(reports.len(), 12);
        assert!(reports.iter().all(|r| r.subjects.len() == 1));
        assert!(reports.iter().all(|r| r.overall_gpa == "4.00"));

        drop(conn);
        let _ = std::fs::remove_dir_all(&ws);
    }
}
