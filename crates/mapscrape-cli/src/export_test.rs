use super::*;

fn full_record() -> BusinessRecord {
    BusinessRecord {
        name: Some("Blue Door Coffee".to_string()),
        phone: Some("(512) 555-0100".to_string()),
        email: Some("info@bluedoor.example".to_string()),
        website: Some("https://bluedoor.example/".to_string()),
        rating: Some(4.5),
        review_count: Some(1234),
        category: Some("Coffee shop".to_string()),
        address: Some("100 Congress Ave, Austin, TX 78701".to_string()),
        maps_url: "https://www.google.com/maps/place/Blue+Door+Coffee/data=!4m2".to_string(),
    }
}

fn csv_string(records: &[BusinessRecord]) -> String {
    let mut out = Vec::new();
    write_csv(records, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn csv_fields_with_delimiters_quotes_and_line_breaks_read_back_intact() {
    let mut record = full_record();
    record.name = Some("Joe's \"Best\" Tacos, Inc.".to_string());
    record.address = Some("Suite 4\n100 Congress Ave\r\nAustin, TX".to_string());
    let csv = csv_string(&[record.clone()]);

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), COLUMNS.to_vec());

    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][0], record.name.as_deref().unwrap());
    assert_eq!(&rows[0][7], record.address.as_deref().unwrap());
    assert_eq!(&rows[0][8], record.maps_url);
}

#[test]
fn csv_quotes_only_fields_that_need_it() {
    let mut record = full_record();
    record.name = Some("Joe's \"Best\"".to_string());
    let csv = csv_string(&[record]);
    assert!(csv.lines().nth(1).unwrap().starts_with("\"Joe's \"\"Best\"\"\",(512) 555-0100,"));
}

#[test]
fn csv_has_header_and_one_line_per_record() {
    let csv = csv_string(&[full_record()]);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "Company Name,Phone Number,Email,Website,Rating,Review Count,Category,Address,Google Maps URL"
    );
    assert_eq!(
        lines[1],
        "Blue Door Coffee,(512) 555-0100,info@bluedoor.example,https://bluedoor.example/,4.5,1234,Coffee shop,\"100 Congress Ave, Austin, TX 78701\",https://www.google.com/maps/place/Blue+Door+Coffee/data=!4m2"
    );
    assert_eq!(lines.len(), 2);
}

#[test]
fn csv_missing_fields_are_empty() {
    let record = BusinessRecord::new("https://www.google.com/maps/place/X/data=!4m2");
    let csv = csv_string(&[record]);
    assert_eq!(
        csv.lines().nth(1),
        Some(",,,,,,,,https://www.google.com/maps/place/X/data=!4m2")
    );
}

#[test]
fn csv_rating_keeps_one_decimal() {
    let mut record = full_record();
    record.rating = Some(4.0);
    let csv = csv_string(&[record]);
    assert!(csv.lines().nth(1).unwrap().contains(",4.0,1234,"));
}

#[test]
fn json_is_array_of_records_with_nulls() {
    let mut out = Vec::new();
    let records = vec![
        full_record(),
        BusinessRecord::new("https://www.google.com/maps/place/X/data=!4m2"),
    ];
    write_json(&records, &mut out).unwrap();

    let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let array = parsed.as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(array[0]["name"], "Blue Door Coffee");
    assert_eq!(array[0]["review_count"], 1234);
    assert_eq!(array[0]["rating"], 4.5);
    assert!(array[1]["email"].is_null());
    assert_eq!(
        array[1]["maps_url"],
        "https://www.google.com/maps/place/X/data=!4m2"
    );
}

#[test]
fn json_round_trips_into_records() {
    let mut out = Vec::new();
    write_json(&[full_record()], &mut out).unwrap();
    let back: Vec<BusinessRecord> = serde_json::from_slice(&out).unwrap();
    assert_eq!(back, vec![full_record()]);
}

#[test]
fn workbook_serializes_to_xlsx_archive() {
    let mut workbook = build_workbook(&[full_record()]).unwrap();
    let bytes = workbook.save_to_buffer().unwrap();
    assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
}

#[test]
fn write_records_creates_file_in_each_format() {
    let dir = std::env::temp_dir().join(format!("mapscrape-export-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    for format in [OutputFormat::Csv, OutputFormat::Json, OutputFormat::Xlsx] {
        let path = dir.join(format!("leads.{}", format.extension()));
        write_records(&[full_record()], &path, format).unwrap();
        let written = std::fs::metadata(&path).unwrap();
        assert!(written.len() > 0, "{format} output is empty");
    }

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn write_records_reports_unwritable_path() {
    let path = Path::new("/nonexistent-mapscrape-dir/leads.csv");
    let err = write_records(&[full_record()], path, OutputFormat::Csv).unwrap_err();
    assert!(matches!(err, ExportError::Io { .. }));
    assert!(err.to_string().contains("leads.csv"));
}
