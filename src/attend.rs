use serde::Serialize;
use std::collections::HashMap;

/// Sentinel record id for roster students with no attendance row yet.
pub const NO_RECORD_ID: &str = "none";

#[derive(Debug, Clone, Serialize)]
pub struct CoreError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CoreError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db_query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn db_update(e: impl std::fmt::Display) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::new("export_failed", message)
    }
}

/// Who wrote an attendance record. Exactly one provenance flag is set
/// per write; a later write from the other path overwrites both flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkedBy {
    SelfMarked,
    Teacher,
}

impl MarkedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkedBy::SelfMarked => "self",
            MarkedBy::Teacher => "teacher",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, CoreError> {
        match tag {
            "self" => Ok(MarkedBy::SelfMarked),
            "teacher" => Ok(MarkedBy::Teacher),
            other => Err(CoreError::bad_params(format!(
                "markedBy must be 'self' or 'teacher', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_no: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// Times are RFC 3339 text, the same form they take in the store.
/// `schedule::session_window` parses them when classification needs
/// actual instants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub unit_id: String,
    pub starts_at: String,
    pub ends_at: String,
    pub location: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub session_id: String,
    pub student_id: String,
    pub is_present: bool,
    pub marked_by_self: bool,
    pub marked_by_teacher: bool,
    pub marked_at: Option<String>,
}

/// One roster student's attendance outcome for a session: either the
/// stored record or a synthesized absent/unmarked default. Resolved
/// through a typed lookup, never by shape inspection.
#[derive(Debug, Clone)]
pub enum AttendanceEntry {
    Recorded {
        student: Student,
        record: AttendanceRecord,
    },
    Default {
        student: Student,
    },
}

impl AttendanceEntry {
    pub fn student(&self) -> &Student {
        match self {
            AttendanceEntry::Recorded { student, .. } => student,
            AttendanceEntry::Default { student } => student,
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            AttendanceEntry::Recorded { record, .. } => &record.id,
            AttendanceEntry::Default { .. } => NO_RECORD_ID,
        }
    }

    pub fn is_present(&self) -> bool {
        match self {
            AttendanceEntry::Recorded { record, .. } => record.is_present,
            AttendanceEntry::Default { .. } => false,
        }
    }

    pub fn marked_by_self(&self) -> bool {
        match self {
            AttendanceEntry::Recorded { record, .. } => record.marked_by_self,
            AttendanceEntry::Default { .. } => false,
        }
    }

    pub fn marked_by_teacher(&self) -> bool {
        match self {
            AttendanceEntry::Recorded { record, .. } => record.marked_by_teacher,
            AttendanceEntry::Default { .. } => false,
        }
    }

    pub fn marked_at(&self) -> Option<&str> {
        match self {
            AttendanceEntry::Recorded { record, .. } => record.marked_at.as_deref(),
            AttendanceEntry::Default { .. } => None,
        }
    }
}

/// Derived per-session view, one entry per roster student in roster
/// order. Never persisted; recomputed on every open.
#[derive(Debug, Clone)]
pub struct ReconciledView {
    pub session_id: String,
    pub entries: Vec<AttendanceEntry>,
}

/// Merge the roster with whatever records exist for the session.
/// Single pass over each input; records for students no longer on the
/// roster are dropped. A roster that repeats a student id yields one
/// entry per occurrence, all resolving to the same record.
pub fn reconcile(
    roster: &[Student],
    existing: &[AttendanceRecord],
    session_id: &str,
) -> ReconciledView {
    let by_student: HashMap<&str, &AttendanceRecord> = existing
        .iter()
        .map(|r| (r.student_id.as_str(), r))
        .collect();

    let entries = roster
        .iter()
        .map(|s| match by_student.get(s.id.as_str()) {
            Some(record) => AttendanceEntry::Recorded {
                student: s.clone(),
                record: (*record).clone(),
            },
            None => AttendanceEntry::Default { student: s.clone() },
        })
        .collect();

    ReconciledView {
        session_id: session_id.to_string(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str) -> Student {
        Student {
            id: id.to_string(),
            student_no: format!("S-{}", id),
            display_name: format!("Surname, {}", id),
            email: None,
        }
    }

    fn record(id: &str, student_id: &str, present: bool) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            session_id: "sess-1".to_string(),
            student_id: student_id.to_string(),
            is_present: present,
            marked_by_self: false,
            marked_by_teacher: true,
            marked_at: Some("2026-03-02T10:05:00Z".to_string()),
        }
    }

    #[test]
    fn output_length_matches_roster() {
        let roster = vec![student("a"), student("b"), student("c")];
        let existing = vec![record("r1", "a", true)];
        let view = reconcile(&roster, &existing, "sess-1");
        assert_eq!(view.entries.len(), roster.len());
    }

    #[test]
    fn missing_records_synthesize_absent_unmarked() {
        let roster = vec![student("a"), student("b")];
        let existing = vec![record("r1", "a", true)];
        let view = reconcile(&roster, &existing, "sess-1");

        let b = &view.entries[1];
        assert_eq!(b.record_id(), NO_RECORD_ID);
        assert!(!b.is_present());
        assert!(!b.marked_by_self());
        assert!(!b.marked_by_teacher());
        assert_eq!(b.marked_at(), None);
    }

    #[test]
    fn roster_order_is_preserved() {
        let roster = vec![student("c"), student("a"), student("b")];
        let view = reconcile(&roster, &[], "sess-1");
        let ids: Vec<&str> = view.entries.iter().map(|e| e.student().id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_roster_ids_repeat_the_same_record() {
        let roster = vec![student("a"), student("a")];
        let existing = vec![record("r1", "a", true)];
        let view = reconcile(&roster, &existing, "sess-1");
        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].record_id(), "r1");
        assert_eq!(view.entries[1].record_id(), "r1");
    }

    #[test]
    fn records_off_the_roster_are_dropped() {
        let roster = vec![student("a")];
        let existing = vec![record("r1", "a", true), record("r2", "withdrawn", true)];
        let view = reconcile(&roster, &existing, "sess-1");
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].student().id, "a");
    }

    #[test]
    fn marked_by_parse_rejects_unknown_tags() {
        assert!(MarkedBy::parse("self").is_ok());
        assert!(MarkedBy::parse("teacher").is_ok());
        let e = MarkedBy::parse("admin").unwrap_err();
        assert_eq!(e.code, "bad_params");
    }
}
