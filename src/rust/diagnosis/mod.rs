//! Diagnosis records, severity rules and guidance synthesis.

mod knowledge;
mod record;
mod severity;
mod synthesizer;

pub use knowledge::{DiseaseKnowledgeEntry, KnowledgeBase};
pub use record::{Alternate, DiagnosisRecord, ProviderTier, Severity};
pub use severity::{bucket_severity, infer_severity_from_text};
pub use synthesizer::{parse_label, ParsedLabel, StructuredDiagnosis, Synthesizer, LABEL_DELIMITER, TOP_PREDICTIONS};
