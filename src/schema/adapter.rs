//! Parsing and batch validation for recorded frames

use crate::error::AnalysisError;
use crate::schema::frame_record::*;
use crate::types::FrameObservation;

/// Adapter for reading recorded frames
pub struct FrameRecordAdapter;

impl FrameRecordAdapter {
    /// Parse a JSON string containing an array of FrameRecords
    pub fn parse_array(json: &str) -> Result<Vec<FrameRecord>, AnalysisError> {
        let records: Vec<FrameRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing FrameRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FrameRecord>, AnalysisError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(AnalysisError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Parse either a JSON array or NDJSON, judged by the first non-blank character
    pub fn parse(input: &str) -> Result<Vec<FrameRecord>, AnalysisError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Observations from valid, ready records, in order
    pub fn to_observations(records: &[FrameRecord]) -> Result<Vec<FrameObservation>, AnalysisError> {
        let mut observations = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if let Err(e) = record.validate() {
                return Err(AnalysisError::InvalidObservation(format!(
                    "Invalid record {idx}: {e}"
                )));
            }
            if record.video_ready {
                observations.push(record.observation.clone());
            }
        }
        Ok(observations)
    }

    /// Validate a batch of records, returning only the failures
    pub fn validate_records(records: &[FrameRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index: idx,
                    record_id: record.record_id.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub index: usize,
    pub record_id: Option<String>,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;

    const NDJSON: &str = r#"
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:00Z", "question": 0}

{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:00.5Z", "question": 0, "video_ready": false}
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:01Z", "question": 1}
"#;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let records = FrameRecordAdapter::parse_ndjson(NDJSON).unwrap();
        assert_eq!(records.len(), 3);
        assert!(!records[1].video_ready);
        assert_eq!(records[2].question, Some(1));
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"schema_version\": \"poise.frame_record.v1\", \"timestamp\": \"2024-01-15T08:30:00Z\"}\nnot json\n";
        let err = FrameRecordAdapter::parse_ndjson(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_detects_array() {
        let json = r#"[{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:00Z"}]"#;
        assert_eq!(FrameRecordAdapter::parse(json).unwrap().len(), 1);
        assert_eq!(FrameRecordAdapter::parse(NDJSON).unwrap().len(), 3);
    }

    #[test]
    fn test_to_observations_drops_not_ready() {
        let records = FrameRecordAdapter::parse_ndjson(NDJSON).unwrap();
        let observations = FrameRecordAdapter::to_observations(&records).unwrap();
        assert_eq!(observations.len(), 2);
    }

    #[test]
    fn test_validate_records() {
        let mut records = FrameRecordAdapter::parse_ndjson(NDJSON).unwrap();
        records[2].schema_version = "other".to_string();
        records[2].record_id = Some("r-3".to_string());

        let failures = FrameRecordAdapter::validate_records(&records);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert_eq!(failures[0].record_id.as_deref(), Some("r-3"));
        assert!(FrameRecordAdapter::to_observations(&records).is_err());
    }
}
