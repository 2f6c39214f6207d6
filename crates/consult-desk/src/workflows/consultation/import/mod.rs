mod parser;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Weekday};

use super::domain::{
    parse_clock_time, ScheduleError, ScheduleException, StaffId, StaffMember, WorkingPattern,
};
use super::memory::ScheduleSnapshot;
use parser::ScheduleRow;

#[derive(Debug)]
pub enum ScheduleImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, reason: String },
}

impl std::fmt::Display for ScheduleImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleImportError::Io(err) => write!(f, "failed to read schedule file: {}", err),
            ScheduleImportError::Csv(err) => write!(f, "invalid schedule CSV data: {}", err),
            ScheduleImportError::InvalidRow { line, reason } => {
                write!(f, "schedule row {} rejected: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for ScheduleImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScheduleImportError::Io(err) => Some(err),
            ScheduleImportError::Csv(err) => Some(err),
            ScheduleImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for ScheduleImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ScheduleImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Loads staff schedules from a CSV export.
///
/// Columns: `Staff ID, Name, Email, Kind, Day, Start, End, Slot Minutes, Max Per Day`.
/// `Kind` is `pattern` (Day is a weekday), `closed`, or `hours` (Day is `YYYY-MM-DD`).
/// Staff members are taken from the first row that names them.
pub struct ScheduleImporter;

impl ScheduleImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ScheduleSnapshot, ScheduleImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<ScheduleSnapshot, ScheduleImportError> {
        let mut staff: BTreeMap<StaffId, StaffMember> = BTreeMap::new();
        let mut snapshot = ScheduleSnapshot::default();

        for (line, row) in parser::parse_rows(reader)? {
            let invalid = |reason: String| ScheduleImportError::InvalidRow { line, reason };
            if row.staff_id.is_empty() {
                return Err(invalid("Staff ID is required".to_string()));
            }
            let staff_id = StaffId(row.staff_id.clone());

            if let (Some(name), Some(email)) = (&row.name, &row.email) {
                staff.entry(staff_id.clone()).or_insert_with(|| StaffMember {
                    id: staff_id.clone(),
                    display_name: name.clone(),
                    email: email.clone(),
                    active: true,
                });
            }

            match row.kind.to_ascii_lowercase().as_str() {
                "pattern" => {
                    let weekday = row
                        .day
                        .parse::<Weekday>()
                        .map_err(|_| invalid(format!("'{}' is not a weekday", row.day)))?;
                    let (start, end, slot_minutes, cap) = hours(&row).map_err(&invalid)?;
                    let pattern =
                        WorkingPattern::new(staff_id, weekday, start, end, slot_minutes, cap)
                            .map_err(|err: ScheduleError| invalid(err.to_string()))?;
                    snapshot.patterns.push(pattern);
                }
                "closed" => {
                    let date = date(&row.day).map_err(&invalid)?;
                    snapshot
                        .exceptions
                        .push(ScheduleException::closed(staff_id, date));
                }
                "hours" => {
                    let date = date(&row.day).map_err(&invalid)?;
                    let (start, end, slot_minutes, cap) = hours(&row).map_err(&invalid)?;
                    let exception = ScheduleException::custom_hours(
                        staff_id,
                        date,
                        start,
                        end,
                        slot_minutes,
                        cap,
                    )
                    .map_err(|err| invalid(err.to_string()))?;
                    snapshot.exceptions.push(exception);
                }
                other => return Err(invalid(format!("unknown row kind '{other}'"))),
            }
        }

        let referenced = snapshot
            .patterns
            .iter()
            .map(|pattern| &pattern.staff_id)
            .chain(snapshot.exceptions.iter().map(|exception| &exception.staff_id));
        for staff_id in referenced {
            if !staff.contains_key(staff_id) {
                return Err(ScheduleImportError::InvalidRow {
                    line: 0,
                    reason: format!("staff member {staff_id} has no row with Name and Email"),
                });
            }
        }

        snapshot.staff = staff.into_values().collect();
        Ok(snapshot)
    }
}

fn date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn hours(row: &ScheduleRow) -> Result<(NaiveTime, NaiveTime, u32, Option<u32>), String> {
    let clock = |value: &Option<String>, column: &str| {
        value
            .as_deref()
            .and_then(parse_clock_time)
            .ok_or_else(|| format!("{column} must be HH:MM"))
    };
    let start = clock(&row.start, "Start")?;
    let end = clock(&row.end, "End")?;
    let slot_minutes = row
        .slot_minutes
        .as_deref()
        .ok_or_else(|| "Slot Minutes is required".to_string())?
        .parse::<u32>()
        .map_err(|_| "Slot Minutes must be a whole number".to_string())?;
    let cap = row
        .max_per_day
        .as_deref()
        .map(|raw| {
            raw.parse::<u32>()
                .map_err(|_| "Max Per Day must be a whole number".to_string())
        })
        .transpose()?;

    Ok((start, end, slot_minutes, cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::consultation::domain::ExceptionKind;
    use std::io::Cursor;

    const HEADER: &str = "Staff ID,Name,Email,Kind,Day,Start,End,Slot Minutes,Max Per Day\n";

    #[test]
    fn imports_patterns_and_exceptions() {
        let csv = format!(
            "{HEADER}\
A,Avery Stone,avery@example.com,pattern,Mon,09:00,10:00,30,2\n\
A,,,closed,2025-12-25,,,,\n\
A,,,hours,2025-12-24,09:00,12:00,60,\n"
        );

        let snapshot = ScheduleImporter::from_reader(Cursor::new(csv)).expect("import succeeds");

        assert_eq!(snapshot.staff.len(), 1);
        assert_eq!(snapshot.staff[0].email, "avery@example.com");
        assert_eq!(snapshot.patterns.len(), 1);
        assert_eq!(snapshot.patterns[0].weekday, Weekday::Mon);
        assert_eq!(snapshot.patterns[0].max_bookings_per_day, Some(2));
        assert_eq!(snapshot.exceptions.len(), 2);
        assert_eq!(snapshot.exceptions[0].kind, ExceptionKind::Closed);
        assert!(matches!(
            snapshot.exceptions[1].kind,
            ExceptionKind::CustomHours {
                slot_minutes: 60,
                max_bookings_per_day: None,
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_hours_with_line_number() {
        let csv = format!("{HEADER}A,Avery Stone,avery@example.com,pattern,Tue,11:00,10:00,30,\n");

        match ScheduleImporter::from_reader(Cursor::new(csv)) {
            Err(ScheduleImportError::InvalidRow { line, reason }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("start before it ends"));
            }
            other => panic!("expected invalid row, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_kinds_and_weekdays() {
        let csv = format!("{HEADER}A,Avery Stone,avery@example.com,holiday,2025-12-25,,,,\n");
        assert!(matches!(
            ScheduleImporter::from_reader(Cursor::new(csv)),
            Err(ScheduleImportError::InvalidRow { .. })
        ));

        let csv = format!("{HEADER}A,Avery Stone,avery@example.com,pattern,Someday,09:00,10:00,30,\n");
        assert!(matches!(
            ScheduleImporter::from_reader(Cursor::new(csv)),
            Err(ScheduleImportError::InvalidRow { .. })
        ));
    }

    #[test]
    fn requires_staff_contact_details() {
        let csv = format!("{HEADER}B,,,pattern,Wed,09:00,10:00,30,\n");
        match ScheduleImporter::from_reader(Cursor::new(csv)) {
            Err(ScheduleImportError::InvalidRow { reason, .. }) => {
                assert!(reason.contains("staff member B"));
            }
            other => panic!("expected missing staff error, got {other:?}"),
        }
    }

    #[test]
    fn from_path_propagates_io_errors() {
        match ScheduleImporter::from_path("./does-not-exist.csv") {
            Err(ScheduleImportError::Io(_)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
