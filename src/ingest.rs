use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::aggregate::compute_average_score;
use crate::error::IngestError;
use crate::models::{ExpertiseScores, SessionRecord};

pub const COL_ID: &str = "ID";
pub const COL_ADVISOR: &str = "Asesor Evaluado";
pub const COL_EVALUATOR: &str = "Evaluador";
pub const COL_TRAINING_DATE: &str = "Fecha de Capa";
pub const COL_SESSION_START: &str = "Fecha de Inicio";
pub const COL_DURATION: &str = "Duración de Capa";
pub const COL_PRESENTATION: &str = "Nivel de Expertise en Presentación";
pub const COL_PROBING: &str = "Nivel de Expertise en Sondeo";
pub const COL_ARGUMENTATION: &str = "Nivel de Expertise en Argumentación";
pub const COL_REBUTTAL: &str = "Nivel de Expertise en Rebate";
pub const COL_CLOSING: &str = "Nivel de Expertise en Cierre";
pub const COL_COMMENTS: &str = "Detalles o Comentarios Adicionales";

pub const REQUIRED_COLUMNS: [&str; 12] = [
    COL_ID,
    COL_ADVISOR,
    COL_EVALUATOR,
    COL_TRAINING_DATE,
    COL_SESSION_START,
    COL_DURATION,
    COL_PRESENTATION,
    COL_PROBING,
    COL_ARGUMENTATION,
    COL_REBUTTAL,
    COL_CLOSING,
    COL_COMMENTS,
];

// Spreadsheet serial days are counted from this epoch.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
const SERIAL_MIN: f64 = 20_000.0;
const SERIAL_MAX: f64 = 80_000.0;

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub delimiter: u8,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Workbook,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => SourceFormat::Workbook,
            _ => SourceFormat::Delimited,
        }
    }
}

/// Position of each required column in the source header, in `REQUIRED_COLUMNS` order.
struct ColumnMap {
    positions: [usize; REQUIRED_COLUMNS.len()],
}

impl ColumnMap {
    fn locate(headers: &[String], origin: &Path) -> Result<Self, IngestError> {
        let mut positions = [0; REQUIRED_COLUMNS.len()];
        for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|header| clean_header(header) == column)
                .ok_or_else(|| IngestError::MissingColumn {
                    path: origin.to_path_buf(),
                    column,
                })?;
        }
        Ok(Self { positions })
    }

    fn select(
        &self,
        cell: impl Fn(usize) -> Option<String>,
    ) -> [Option<String>; REQUIRED_COLUMNS.len()] {
        self.positions.map(cell)
    }
}

fn normalize_row(cells: [Option<String>; REQUIRED_COLUMNS.len()]) -> SessionRecord {
    let [
        id,
        advisor,
        evaluator,
        training_date,
        session_start,
        duration,
        presentation,
        probing,
        argumentation,
        rebuttal,
        closing,
        comments,
    ] = cells;

    let expertise = ExpertiseScores {
        presentation: parse_number_cell(presentation.as_deref()),
        probing: parse_number_cell(probing.as_deref()),
        argumentation: parse_number_cell(argumentation.as_deref()),
        rebuttal: parse_number_cell(rebuttal.as_deref()),
        closing: parse_number_cell(closing.as_deref()),
    };
    let average_score = compute_average_score(&expertise);

    SessionRecord {
        id: id.map(|id| id.trim().to_string()).unwrap_or_default(),
        evaluated_advisor: text_cell(advisor),
        evaluator: text_cell(evaluator),
        training_date: parse_datetime_cell(training_date.as_deref()).map(|dt| dt.date()),
        session_start: parse_datetime_cell(session_start.as_deref()),
        duration_minutes: parse_number_cell(duration.as_deref()),
        expertise,
        comments: text_cell(comments),
        average_score,
    }
}

/// Loads a workbook (`.xlsx`, `.xls`, `.ods`, ...) or a delimited export, chosen by extension.
pub fn load_sessions(path: &Path, options: &IngestOptions) -> Result<Vec<SessionRecord>, IngestError> {
    match SourceFormat::from_path(path) {
        SourceFormat::Workbook => read_workbook(path),
        SourceFormat::Delimited => {
            let file = File::open(path).map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            read_sessions(file, options, path)
        }
    }
}

/// Reads every data row of a delimited export, preserving source order. `origin` only labels errors.
pub fn read_sessions<R: Read>(
    input: R,
    options: &IngestOptions,
    origin: &Path,
) -> Result<Vec<SessionRecord>, IngestError> {
    let csv_error = |source| IngestError::Csv {
        path: origin.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(input);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(csv_error)?
        .iter()
        .map(|header| String::from_utf8_lossy(header).into_owned())
        .collect();
    let columns = ColumnMap::locate(&headers, origin)?;

    let mut sessions = Vec::new();
    for result in reader.byte_records() {
        let row = result.map_err(csv_error)?;
        let cells = columns.select(|position| row.get(position).map(decode_cell));
        sessions.push(normalize_row(cells));
    }

    tracing::debug!(rows = sessions.len(), source = %origin.display(), "loaded training sessions");
    Ok(sessions)
}

/// Reads the first worksheet; its first row holds the column names.
pub fn read_workbook(path: &Path) -> Result<Vec<SessionRecord>, IngestError> {
    let workbook_error = |source| IngestError::Workbook {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::EmptyWorkbook {
            path: path.to_path_buf(),
        })?
        .map_err(workbook_error)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| workbook_cell(cell).unwrap_or_default()).collect())
        .unwrap_or_default();
    let columns = ColumnMap::locate(&headers, path)?;

    let mut sessions = Vec::new();
    for row in rows {
        if row.iter().all(|cell| workbook_cell(cell).is_none()) {
            continue;
        }
        let cells = columns.select(|position| row.get(position).and_then(workbook_cell));
        sessions.push(normalize_row(cells));
    }

    tracing::debug!(rows = sessions.len(), source = %path.display(), "loaded training sessions");
    Ok(sessions)
}

// Invalid UTF-8 (legacy code page exports) is replaced rather than rejected.
fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            tracing::trace!(cell = %text, "cell is not valid UTF-8, decoded lossily");
            text
        }
    }
}

fn workbook_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => Some(text.clone()),
        Data::Float(number) => Some(number.to_string()),
        Data::Int(number) => Some(number.to_string()),
        Data::Bool(flag) => Some(flag.to_string()),
        Data::DateTime(moment) => Some(moment.as_f64().to_string()),
    }
}

fn clean_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

fn text_cell(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

pub fn parse_number_cell(raw: Option<&str>) -> Option<f64> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = value.parse::<f64>().ok().or_else(|| {
        if value.matches(',').count() == 1 && !value.contains('.') {
            value.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    });

    match parsed {
        Some(number) if number.is_finite() => Some(number),
        _ => {
            tracing::trace!(cell = value, "non-numeric cell treated as missing");
            None
        }
    }
}

pub fn parse_datetime_cell(raw: Option<&str>) -> Option<NaiveDateTime> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }

    if let Some(parsed) = parse_serial_date(value) {
        return Some(parsed);
    }

    tracing::trace!(cell = value, "unparseable date treated as missing");
    None
}

fn parse_serial_date(value: &str) -> Option<NaiveDateTime> {
    let serial = value.parse::<f64>().ok()?;
    if !(SERIAL_MIN..=SERIAL_MAX).contains(&serial) {
        return None;
    }

    let (year, month, day) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

/// Header line of a comma-delimited export carrying every required column.
#[cfg(test)]
pub(crate) fn header_line() -> String {
    REQUIRED_COLUMNS.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read(body: &str) -> Result<Vec<SessionRecord>, IngestError> {
        let input = format!("{}\n{body}", header_line());
        read_sessions(input.as_bytes(), &IngestOptions::default(), Path::new("inline.csv"))
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn normalizes_a_complete_row() {
        let sessions = read(
            "7,Camila Rojas,Valentina Soto,2024-01-15,2024-01-15 09:30:00,45,4,3,5,4,4,Strong close\n",
        )
        .unwrap();

        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.id, "7");
        assert_eq!(session.evaluated_advisor.as_deref(), Some("Camila Rojas"));
        assert_eq!(session.evaluator.as_deref(), Some("Valentina Soto"));
        assert_eq!(session.training_date, Some(date(2024, 1, 15)));
        assert_eq!(
            session.session_start,
            Some(date(2024, 1, 15).and_hms_opt(9, 30, 0).unwrap())
        );
        assert_eq!(session.duration_minutes, Some(45.0));
        assert_eq!(session.expertise.argumentation, Some(5.0));
        assert_eq!(session.comments.as_deref(), Some("Strong close"));
        assert!((session.average_score.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_cells_degrade_to_missing() {
        let sessions = read("8,,,not a date,32/13/2024,n/a,,x,NaN,,inf,\n").unwrap();

        let session = &sessions[0];
        assert_eq!(session.evaluated_advisor, None);
        assert_eq!(session.evaluator, None);
        assert_eq!(session.training_date, None);
        assert_eq!(session.session_start, None);
        assert_eq!(session.duration_minutes, None);
        assert_eq!(session.expertise, ExpertiseScores::default());
        assert_eq!(session.average_score, None);
        assert_eq!(session.comments, None);
    }

    #[test]
    fn preserves_source_row_order() {
        let sessions = read(
            "3,B,T,2024-03-01,,10,,,,,,\n1,A,T,2024-01-01,,20,,,,,,\n2,C,T,2024-02-01,,30,,,,,,\n",
        )
        .unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let input = "ID,Asesor Evaluado\n1,A\n";
        let err = read_sessions(input.as_bytes(), &IngestOptions::default(), Path::new("x.csv"))
            .unwrap_err();
        match err {
            IngestError::MissingColumn { column, .. } => assert_eq!(column, COL_EVALUATOR),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_byte_order_mark_is_ignored() {
        let input = format!("\u{feff}{}\n1,A,T,,,,,,,,,\n", header_line());
        let sessions =
            read_sessions(input.as_bytes(), &IngestOptions::default(), Path::new("bom.csv")).unwrap();
        assert_eq!(sessions[0].id, "1");
    }

    #[test]
    fn advisor_names_are_kept_verbatim() {
        let sessions = read("1,Camila Rojas ,T,,,,,,,,,\n").unwrap();
        assert_eq!(sessions[0].evaluated_advisor.as_deref(), Some("Camila Rojas "));
    }

    #[test]
    fn semicolon_delimited_export_with_decimal_commas() {
        let input = format!("{}\n1;A;T;15/01/2024;;37,5;4,5;;;;;ok\n", REQUIRED_COLUMNS.join(";"));
        let sessions = read_sessions(
            input.as_bytes(),
            &IngestOptions { delimiter: b';' },
            Path::new("export.csv"),
        )
        .unwrap();

        assert_eq!(sessions[0].training_date, Some(date(2024, 1, 15)));
        assert_eq!(sessions[0].duration_minutes, Some(37.5));
        assert_eq!(sessions[0].average_score, Some(4.5));
    }

    #[test]
    fn date_cells_accept_common_spreadsheet_forms() {
        let expected = date(2024, 1, 15);
        for raw in [
            "2024-01-15",
            "2024/01/15",
            "15/01/2024",
            "15-01-2024",
            "2024-01-15 08:00",
            "2024-01-15T08:00:00",
            "2024-01-15T08:00:00Z",
            "45306",
        ] {
            let parsed = parse_datetime_cell(Some(raw)).map(|dt| dt.date());
            assert_eq!(parsed, Some(expected), "input {raw}");
        }
        assert_eq!(parse_datetime_cell(Some("2024")), None);
        assert_eq!(parse_datetime_cell(Some("   ")), None);
    }

    #[test]
    fn number_cells_reject_non_finite_values() {
        assert_eq!(parse_number_cell(Some(" 3.5 ")), Some(3.5));
        assert_eq!(parse_number_cell(Some("NaN")), None);
        assert_eq!(parse_number_cell(Some("-inf")), None);
        assert_eq!(parse_number_cell(Some("1,234.5")), None);
        assert_eq!(parse_number_cell(None), None);
    }

    #[test]
    fn loads_from_disk_and_reports_missing_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", header_line()).unwrap();
        writeln!(file, "1,A,T,2024-01-01,,30,4,4,4,4,4,").unwrap();

        let sessions = load_sessions(file.path(), &IngestOptions::default()).unwrap();
        assert_eq!(sessions.len(), 1);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            load_sessions(&missing, &IngestOptions::default()),
            Err(IngestError::Io { .. })
        ));
    }

    #[test]
    fn invalid_utf8_cell_does_not_abort_the_load() {
        let mut input = format!("{}\n", header_line()).into_bytes();
        input.extend_from_slice(b"1,Camila Rojas,Valentina Soto,2024-01-15,,30,4,4,4,4,4,Buena\n");
        input.extend_from_slice(b"2,Camila Rojas,Valentina Soto,2024-01-16,,3\xf30,4,,,,,Sesi\xf3n buena\n");

        let sessions =
            read_sessions(input.as_slice(), &IngestOptions::default(), Path::new("cp1252.csv")).unwrap();

        assert_eq!(sessions.len(), 2);
        let degraded = &sessions[1];
        assert_eq!(degraded.training_date, Some(date(2024, 1, 16)));
        assert_eq!(degraded.duration_minutes, None);
        assert_eq!(degraded.average_score, Some(4.0));
        let comment = degraded.comments.as_deref().unwrap();
        assert!(comment.starts_with("Sesi"));
        assert!(comment.contains('\u{fffd}'));
        assert!(comment.ends_with("n buena"));
    }

    #[test]
    fn source_format_follows_extension() {
        assert_eq!(SourceFormat::from_path(Path::new("Entrenamiento_R3.xlsx")), SourceFormat::Workbook);
        assert_eq!(SourceFormat::from_path(Path::new("legacy.XLS")), SourceFormat::Workbook);
        assert_eq!(SourceFormat::from_path(Path::new("export.csv")), SourceFormat::Delimited);
        assert_eq!(SourceFormat::from_path(Path::new("export")), SourceFormat::Delimited);
    }

    fn write_workbook(path: &Path, header: &[&str]) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in header.iter().enumerate() {
            sheet.write_string(0, col as u16, *name).unwrap();
        }

        sheet.write_number(1, 0, 7.0).unwrap();
        sheet.write_string(1, 1, "Camila Rojas").unwrap();
        sheet.write_string(1, 2, "Valentina Soto").unwrap();
        sheet.write_number(1, 3, 45306.0).unwrap();
        sheet.write_string(1, 4, "2024-01-15 09:30:00").unwrap();
        sheet.write_number(1, 5, 45.0).unwrap();
        sheet.write_number(1, 6, 4.0).unwrap();
        sheet.write_number(1, 7, 3.0).unwrap();
        sheet.write_number(1, 8, 5.0).unwrap();
        sheet.write_string(1, 10, "n/a").unwrap();
        sheet.write_string(1, 11, "Cierre sólido").unwrap();

        sheet.write_number(2, 0, 8.0).unwrap();
        sheet.write_string(2, 1, "Diego Fuentes").unwrap();
        sheet.write_string(2, 3, "sin fecha").unwrap();

        workbook.save(path).unwrap();
    }

    #[test]
    fn reads_first_worksheet_of_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Entrenamiento_R3.xlsx");
        write_workbook(&path, &REQUIRED_COLUMNS);

        let sessions = load_sessions(&path, &IngestOptions::default()).unwrap();
        assert_eq!(sessions.len(), 2);

        let first = &sessions[0];
        assert_eq!(first.id, "7");
        assert_eq!(first.evaluated_advisor.as_deref(), Some("Camila Rojas"));
        assert_eq!(first.evaluator.as_deref(), Some("Valentina Soto"));
        assert_eq!(first.training_date, Some(date(2024, 1, 15)));
        assert_eq!(
            first.session_start,
            Some(date(2024, 1, 15).and_hms_opt(9, 30, 0).unwrap())
        );
        assert_eq!(first.duration_minutes, Some(45.0));
        assert_eq!(first.expertise.rebuttal, None);
        assert_eq!(first.expertise.closing, None);
        assert_eq!(first.average_score, Some(4.0));
        assert_eq!(first.comments.as_deref(), Some("Cierre sólido"));

        let second = &sessions[1];
        assert_eq!(second.id, "8");
        assert_eq!(second.evaluator, None);
        assert_eq!(second.training_date, None);
        assert_eq!(second.average_score, None);
    }

    #[test]
    fn workbook_missing_column_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.xlsx");
        write_workbook(&path, &REQUIRED_COLUMNS[..11]);

        match load_sessions(&path, &IngestOptions::default()) {
            Err(IngestError::MissingColumn { column, .. }) => assert_eq!(column, COL_COMMENTS),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
