use serde::Serialize;

use crate::attend::{CourseRef, LevelRef, ReconciledView, Session, UnitRef};

/// Normalized report projection: the only input the exporter accepts.
/// A plain value object; it carries no handles back to the store.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_no: String,
    pub full_name: String,
    pub is_present: bool,
    pub marked_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub rate: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub session: Session,
    pub unit: UnitRef,
    pub course: CourseRef,
    pub level: LevelRef,
    pub students: Vec<ReportRow>,
    pub summary: ReportSummary,
}

/// Project a reconciled view plus pre-resolved reference entities into
/// the report model. Pure: performs no lookups; the caller resolves
/// everything first. An empty roster is a valid degenerate report,
/// not an error.
pub fn assemble_report(
    view: &ReconciledView,
    session: &Session,
    unit: &UnitRef,
    course: &CourseRef,
    level: &LevelRef,
) -> ReportModel {
    let students: Vec<ReportRow> = view
        .entries
        .iter()
        .map(|e| ReportRow {
            student_no: e.student().student_no.clone(),
            full_name: e.student().display_name.clone(),
            is_present: e.is_present(),
            marked_at: e.marked_at().map(|t| t.to_string()),
        })
        .collect();

    let total = students.len();
    let present = students.iter().filter(|r| r.is_present).count();
    let absent = total - present;
    let rate = if total > 0 {
        (100.0 * present as f64 / total as f64).round() as i64
    } else {
        0
    };

    ReportModel {
        session: session.clone(),
        unit: unit.clone(),
        course: course.clone(),
        level: level.clone(),
        students,
        summary: ReportSummary {
            total,
            present,
            absent,
            rate,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attend::{reconcile, AttendanceRecord, Student};

    fn student(id: &str) -> Student {
        Student {
            id: id.to_string(),
            student_no: format!("S-{}", id),
            display_name: format!("Surname, {}", id),
            email: None,
        }
    }

    fn refs() -> (Session, UnitRef, CourseRef, LevelRef) {
        (
            Session {
                id: "sess-1".to_string(),
                unit_id: "unit-1".to_string(),
                starts_at: "2026-03-02T10:00:00Z".to_string(),
                ends_at: "2026-03-02T11:00:00Z".to_string(),
                location: "Room 4".to_string(),
                active: true,
            },
            UnitRef {
                id: "unit-1".to_string(),
                code: "CS101.1".to_string(),
                name: "Intro Programming".to_string(),
            },
            CourseRef {
                id: "course-1".to_string(),
                code: "CS101".to_string(),
                name: "Computer Science".to_string(),
            },
            LevelRef {
                id: "level-1".to_string(),
                name: "Year 1".to_string(),
            },
        )
    }

    #[test]
    fn empty_roster_yields_zero_summary() {
        let (session, unit, course, level) = refs();
        let view = reconcile(&[], &[], "sess-1");
        let report = assemble_report(&view, &session, &unit, &course, &level);
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.present, 0);
        assert_eq!(report.summary.absent, 0);
        assert_eq!(report.summary.rate, 0);
    }

    #[test]
    fn one_of_three_present_rounds_to_33() {
        let (session, unit, course, level) = refs();
        let roster = vec![student("a"), student("b"), student("c")];
        let existing = vec![AttendanceRecord {
            id: "r1".to_string(),
            session_id: "sess-1".to_string(),
            student_id: "a".to_string(),
            is_present: true,
            marked_by_self: false,
            marked_by_teacher: true,
            marked_at: Some("2026-03-02T10:05:00Z".to_string()),
        }];
        let view = reconcile(&roster, &existing, "sess-1");
        let report = assemble_report(&view, &session, &unit, &course, &level);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.present, 1);
        assert_eq!(report.summary.absent, 2);
        assert_eq!(report.summary.rate, 33);
        assert_eq!(report.students[0].marked_at.as_deref(), Some("2026-03-02T10:05:00Z"));
        assert_eq!(report.students[1].marked_at, None);
    }

    #[test]
    fn header_fields_are_copied_verbatim() {
        let (session, unit, course, level) = refs();
        let view = reconcile(&[student("a")], &[], "sess-1");
        let report = assemble_report(&view, &session, &unit, &course, &level);
        assert_eq!(report.unit.name, "Intro Programming");
        assert_eq!(report.course.code, "CS101");
        assert_eq!(report.level.name, "Year 1");
        assert_eq!(report.session.location, "Room 4");
    }

    #[test]
    fn two_of_three_present_rounds_to_67() {
        let (session, unit, course, level) = refs();
        let roster = vec![student("a"), student("b"), student("c")];
        let existing: Vec<AttendanceRecord> = ["a", "b"]
            .iter()
            .map(|id| AttendanceRecord {
                id: format!("r-{}", id),
                session_id: "sess-1".to_string(),
                student_id: id.to_string(),
                is_present: true,
                marked_by_self: true,
                marked_by_teacher: false,
                marked_at: Some("2026-03-02T10:05:00Z".to_string()),
            })
            .collect();
        let view = reconcile(&roster, &existing, "sess-1");
        let report = assemble_report(&view, &session, &unit, &course, &level);
        assert_eq!(report.summary.rate, 67);
    }
}
