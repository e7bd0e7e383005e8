use log::info;
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("school.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_bs TEXT NOT NULL,
            end_bs TEXT NOT NULL,
            start_ad TEXT NOT NULL,
            end_ad TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            roll_no TEXT,
            class_name TEXT NOT NULL,
            faculty TEXT,
            academic_year_id TEXT,
            dob_bs TEXT,
            dob_ad TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    ensure_students_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name, faculty)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_year ON students(academic_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            theory_code TEXT,
            practical_code TEXT,
            class_name TEXT NOT NULL,
            faculty TEXT,
            theory_full_marks REAL NOT NULL DEFAULT 0,
            practical_full_marks REAL NOT NULL DEFAULT 0,
            theory_credit_hour REAL NOT NULL DEFAULT 0,
            practical_credit_hour REAL NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_class ON subjects(class_name, faculty)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            academic_year_id TEXT,
            exam_date_bs TEXT,
            exam_date_ad TEXT,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;

    // Obtained columns carry no type affinity: rows written by older entry
    // screens may hold text, and the report layer coerces on read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            theory_obtained,
            practical_obtained,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, exam_id, subject_id)
        )",
        [],
    )?;
    ensure_marks_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_exam_student ON marks(exam_id, student_id)",
        [],
    )?;

    info!("event=db_open module=db status=ok");
    Ok(conn)
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_marks_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "marks", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE marks ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
