use std::fmt::Write as _;

use crate::diagnosis::StructuredDiagnosis;

pub const DIAGNOSIS_SYSTEM_PROMPT: &str = "You are an experienced plant pathologist helping smallholder farmers. \
Answer in plain language a farmer can act on. Be honest when you are unsure.";

pub const REFINE_SYSTEM_PROMPT: &str = "You are an agricultural extension officer. \
Rewrite the diagnosis you are given into clear, practical advice for a farmer. \
Keep every treatment and prevention step, do not invent new diagnoses, and keep it under 250 words.";

/// Prompt for the remote tiers, which see the image (vision) or only the farmer's description (fallback).
pub fn diagnosis_prompt(crop_hint: Option<&str>, context: Option<&str>, with_image: bool) -> String {
    let mut prompt = String::new();
    if with_image {
        prompt.push_str("Examine the attached photo of a crop leaf and diagnose any disease.\n");
    } else {
        prompt.push_str(
            "A farmer uploaded a photo of a crop leaf that could not be analysed. \
Give the most likely diagnosis from the details below.\n",
        );
    }
    if let Some(crop) = crop_hint.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Crop: {}", crop.trim());
    }
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Farmer's notes: {}", context.trim());
    }
    prompt.push_str(
        "\nStart your reply with exactly one line of the form\n\
Severity: mild|moderate|severe|none\n\
using none when no disease is present. Then give:\n\
1. Disease name, or say no disease was found\n\
2. Symptoms to look for\n\
3. Likely causes\n\
4. Treatment steps\n\
5. Prevention tips\n",
    );
    prompt
}

/// Prompt asking a text service to rewrite template guidance for a local diagnosis.
pub fn refine_prompt(diagnosis: &StructuredDiagnosis, context: Option<&str>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Crop: {}", diagnosis.crop);
    let _ = writeln!(prompt, "Diagnosis: {}", diagnosis.disease);
    let _ = writeln!(prompt, "Confidence: {:.1}%", diagnosis.confidence);
    let _ = writeln!(prompt, "Severity: {}", diagnosis.severity);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(prompt, "Farmer's notes: {}", context.trim());
    }
    let _ = write!(prompt, "\nCurrent guidance:\n{}", diagnosis.guidance);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::Severity;

    #[test]
    fn test_diagnosis_prompt_includes_hints() {
        let prompt = diagnosis_prompt(Some("Maize"), Some("spots after rain"), true);
        assert!(prompt.contains("attached photo"));
        assert!(prompt.contains("Crop: Maize"));
        assert!(prompt.contains("Farmer's notes: spots after rain"));
        assert!(prompt.contains("\nSeverity: mild|moderate|severe|none\n"));
        assert!(!prompt.contains("healthy"));
    }

    #[test]
    fn test_fallback_prompt_skips_blank_hints() {
        let prompt = diagnosis_prompt(Some("  "), None, false);
        assert!(!prompt.contains("attached photo"));
        assert!(!prompt.contains("Crop:"));
    }

    #[test]
    fn test_refine_prompt_carries_diagnosis() {
        let diagnosis = StructuredDiagnosis {
            crop: "Tomato".into(),
            disease: "Late blight".into(),
            is_healthy: false,
            confidence: 91.3,
            severity: Severity::Severe,
            guidance: "Remove infected plants".into(),
            top_predictions: vec![],
        };
        let prompt = refine_prompt(&diagnosis, None);
        assert!(prompt.contains("Diagnosis: Late blight"));
        assert!(prompt.contains("Confidence: 91.3%"));
        assert!(prompt.contains("Severity: severe"));
        assert!(prompt.ends_with("Remove infected plants"));
    }
}
