use serde::{Deserialize, Deserializer};
use std::io::Read;

/// One CSV row, before it is validated into schedule records.
#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleRow {
    #[serde(rename = "Staff ID")]
    pub(crate) staff_id: String,
    #[serde(rename = "Name", default, deserialize_with = "empty_string_as_none")]
    pub(crate) name: Option<String>,
    #[serde(rename = "Email", default, deserialize_with = "empty_string_as_none")]
    pub(crate) email: Option<String>,
    #[serde(rename = "Kind")]
    pub(crate) kind: String,
    #[serde(rename = "Day")]
    pub(crate) day: String,
    #[serde(rename = "Start", default, deserialize_with = "empty_string_as_none")]
    pub(crate) start: Option<String>,
    #[serde(rename = "End", default, deserialize_with = "empty_string_as_none")]
    pub(crate) end: Option<String>,
    #[serde(
        rename = "Slot Minutes",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) slot_minutes: Option<String>,
    #[serde(
        rename = "Max Per Day",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) max_per_day: Option<String>,
}

/// Rows paired with their 1-based line number (the header is line 1).
pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<(usize, ScheduleRow)>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<ScheduleRow>().enumerate() {
        rows.push((index + 2, record?));
    }

    Ok(rows)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
