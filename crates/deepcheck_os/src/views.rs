#![forbid(unsafe_code)]

use deepcheck_kernel_contracts::history::HistoryRecord;
use serde::Serialize;

pub const EMPTY_HISTORY_CAPTION: &str = "No detections yet";
pub const CONFIDENCE_DISCLAIMER: &str = "Prediction confidence may vary as this is a prototype \
     system using a lightweight pre-trained AI model.";

/// Outcome of one verification as shown to the user right after upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub record: HistoryRecord,
    pub prediction_line: String,
    pub confidence_line: String,
}

impl VerificationResult {
    pub fn from_record(record: HistoryRecord) -> Self {
        let prediction_line = format!("Prediction: {}", record.prediction);
        let confidence_line = format!("Confidence: {:.2}%", record.confidence.percent());
        Self {
            record,
            prediction_line,
            confidence_line,
        }
    }
}

pub fn sidebar_line(record: &HistoryRecord) -> String {
    format!(
        "{} | {} → {} ({:.1}%)",
        record.timestamp,
        record.filename.as_str(),
        record.prediction,
        record.confidence.percent()
    )
}

/// Renders records in the order given; callers pass most-recent-first.
pub fn sidebar_lines(records: &[HistoryRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec![EMPTY_HISTORY_CAPTION.to_string()];
    }
    records.iter().map(sidebar_line).collect()
}

pub fn signed_in_caption(username: &str) -> String {
    format!("Logged in as: {username}")
}
