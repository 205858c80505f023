use std::collections::BTreeMap;
use std::io::Write;

use thiserror::Error;

use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::identity::domain::person::StudentInfo;

const HEADER: [&str; 6] = [
    "Roll Number",
    "Name",
    "Department / Year",
    "Date",
    "Emotion",
    "Status",
];

#[derive(Error, Debug)]
pub enum CsvExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one `Present` row per attendance record whose face is still
/// linked to a registered student. Returns the number of rows written.
pub fn export_attendance<W: Write>(
    out: W,
    attendance: &[AttendanceRecord],
    face_links: &BTreeMap<u32, String>,
    students: &BTreeMap<String, StudentInfo>,
) -> Result<usize, CsvExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;

    let mut rows = 0;
    for record in attendance {
        let Some(student) = face_links
            .get(&record.persistent_id)
            .and_then(|roll| students.get(roll))
        else {
            continue;
        };
        writer.write_record([
            student.roll_number.clone(),
            student.name.clone(),
            format!("{} / {}", student.department, student.year),
            record.timestamp.format("%Y-%m-%d").to_string(),
            record.emotion.to_string(),
            "Present".to_string(),
        ])?;
        rows += 1;
    }

    writer.flush()?;
    log::debug!("Exported {rows} of {} attendance records", attendance.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Emotion;
    use crate::identity::domain::person::Year;
    use chrono::{TimeZone, Utc};

    fn fixtures() -> (BTreeMap<u32, String>, BTreeMap<String, StudentInfo>) {
        let mut links = BTreeMap::new();
        links.insert(1, "21CS001".to_string());
        links.insert(2, "GONE".to_string());
        let mut students = BTreeMap::new();
        students.insert(
            "21CS001".to_string(),
            StudentInfo {
                name: "Asha, K".into(),
                roll_number: "21CS001".into(),
                department: "CSE".into(),
                year: Year::Third,
                is_blocked: false,
                photo_base64: None,
            },
        );
        (links, students)
    }

    fn record(pid: u32, emotion: Emotion) -> AttendanceRecord {
        AttendanceRecord {
            persistent_id: pid,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap(),
            emotion,
        }
    }

    #[test]
    fn test_rows_for_linked_students() {
        let (links, students) = fixtures();
        let mut buf = Vec::new();

        let rows = export_attendance(
            &mut buf,
            &[record(1, Emotion::Happy)],
            &links,
            &students,
        )
        .unwrap();

        assert_eq!(rows, 1);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Roll Number,Name,Department / Year,Date,Emotion,Status");
        assert_eq!(
            lines[1],
            "21CS001,\"Asha, K\",CSE / 3rd Year,2024-03-09,Happy,Present"
        );
    }

    #[test]
    fn test_orphaned_records_dropped() {
        let (links, students) = fixtures();
        let mut buf = Vec::new();

        let rows = export_attendance(
            &mut buf,
            &[
                record(2, Emotion::Sad),
                record(9, Emotion::Sad),
                record(1, Emotion::Neutral),
            ],
            &links,
            &students,
        )
        .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_empty_log_writes_header_only() {
        let (links, students) = fixtures();
        let mut buf = Vec::new();

        assert_eq!(export_attendance(&mut buf, &[], &links, &students).unwrap(), 0);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
    }
}
