use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::info;
use serde::{Deserialize, Serialize};

/// Static agronomic guidance for one disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseKnowledgeEntry {
    pub symptoms: String,
    pub causes: String,
    pub treatment: Vec<String>,
    pub prevention: Vec<String>,
}

fn entry(symptoms: &str, causes: &str, treatment: &[&str], prevention: &[&str]) -> DiseaseKnowledgeEntry {
    DiseaseKnowledgeEntry {
        symptoms: symptoms.to_string(),
        causes: causes.to_string(),
        treatment: treatment.iter().map(|s| s.to_string()).collect(),
        prevention: prevention.iter().map(|s| s.to_string()).collect(),
    }
}

lazy_static! {
    static ref BUILTIN: Arc<HashMap<String, DiseaseKnowledgeEntry>> = {
        let mut m = HashMap::new();
        m.insert("late blight".to_string(), entry(
            "Dark, water-soaked lesions on leaves and stems, often with white fuzzy growth on the underside in humid weather; brown firm rot on tubers or fruit.",
            "The oomycete Phytophthora infestans, spread by wind and rain splash during cool, wet conditions.",
            &["Remove and destroy infected plants immediately", "Apply a protectant fungicide such as mancozeb or chlorothalonil", "Use a systemic product like metalaxyl where resistance is not reported"],
            &["Plant certified disease-free seed and resistant varieties", "Avoid overhead irrigation and keep foliage dry", "Space plants for good airflow and rotate crops"],
        ));
        m.insert("early blight".to_string(), entry(
            "Brown spots with concentric rings (target pattern) on older leaves, surrounded by yellowing; leaves drop from the bottom up.",
            "The fungus Alternaria solani, surviving in crop debris and favoured by warm, humid weather and plant stress.",
            &["Prune and dispose of affected lower leaves", "Apply copper-based or chlorothalonil fungicide every 7-10 days", "Feed plants to reduce nutrient stress"],
            &["Rotate away from tomato and potato for 2-3 years", "Mulch to stop soil splashing onto leaves", "Water at the base early in the day"],
        ));
        m.insert("apple scab".to_string(), entry(
            "Olive-green to black velvety spots on leaves and fruit; infected fruit becomes cracked and deformed.",
            "The fungus Venturia inaequalis, overwintering in fallen leaves and releasing spores in spring rain.",
            &["Apply captan or sulfur sprays from green tip through petal fall", "Remove heavily infected fruit"],
            &["Rake and destroy fallen leaves in autumn", "Prune to open the canopy", "Choose scab-resistant cultivars"],
        ));
        m.insert("black rot".to_string(), entry(
            "Purple-edged leaf spots ('frog-eye'), sunken cankers on limbs and black, mummified fruit.",
            "The fungus Botryosphaeria obtusa (apple) or Guignardia bidwellii (grape), spreading from dead wood and mummies.",
            &["Cut out cankers and dead wood", "Remove mummified fruit from the plant and ground", "Apply captan or myclobutanil during the susceptible period"],
            &["Keep orchards and vineyards free of debris", "Prune for airflow and sunlight", "Avoid wounding bark and fruit"],
        ));
        m.insert("cedar apple rust".to_string(), entry(
            "Bright yellow-orange spots on upper leaf surfaces, later with small tube-like structures underneath.",
            "The fungus Gymnosporangium juniperi-virginianae, which alternates between junipers and apples.",
            &["Apply myclobutanil or sulfur from pink bud until spots stop appearing"],
            &["Remove nearby juniper hosts where practical", "Plant rust-resistant apple varieties"],
        ));
        m.insert("powdery mildew".to_string(), entry(
            "White to grey powdery patches on leaves, shoots and fruit; leaves may curl and yellow.",
            "Several fungi in the Erysiphales order, favoured by warm days, cool nights and high humidity without rain.",
            &["Spray sulfur, potassium bicarbonate or neem oil at first sign", "Remove badly infected shoots"],
            &["Improve air circulation and avoid excess nitrogen", "Grow tolerant varieties", "Water the soil, not the leaves"],
        ));
        m.insert("bacterial spot".to_string(), entry(
            "Small, dark, greasy-looking spots on leaves and fruit, sometimes with yellow halos; spots may merge and leaves drop.",
            "Xanthomonas bacteria carried on seed and spread by splashing water and handling wet plants.",
            &["Apply copper-based bactericide, alone or with mancozeb", "Remove severely infected leaves", "Avoid working among wet plants"],
            &["Use certified pathogen-free seed and transplants", "Rotate crops for at least one season", "Use drip rather than sprinkler irrigation"],
        ));
        m.insert("leaf mold".to_string(), entry(
            "Pale green to yellow patches on upper leaf surfaces with olive-green velvety mould underneath.",
            "The fungus Passalora fulva, thriving in humid greenhouses and dense plantings.",
            &["Lower humidity and increase ventilation", "Remove affected leaves", "Apply chlorothalonil or copper fungicide"],
            &["Keep relative humidity below 85%", "Space and stake plants for airflow", "Grow resistant varieties"],
        ));
        m.insert("septoria leaf spot".to_string(), entry(
            "Many small circular spots with dark borders and grey centres, often with tiny black dots, starting on lower leaves.",
            "The fungus Septoria lycopersici, surviving on plant debris and spread by water splash.",
            &["Remove infected lower leaves", "Apply chlorothalonil or copper fungicide on a regular schedule"],
            &["Rotate crops and clear debris after harvest", "Mulch and avoid overhead watering"],
        ));
        m.insert("common rust".to_string(), entry(
            "Small, cinnamon-brown powdery pustules on both leaf surfaces.",
            "The fungus Puccinia sorghi, with spores blown in from infected fields during cool, moist weather.",
            &["Apply a triazole or strobilurin fungicide if pustules appear before tasseling"],
            &["Plant resistant hybrids", "Plant early to avoid peak spore periods"],
        ));
        m.insert("northern leaf blight".to_string(), entry(
            "Long, cigar-shaped grey-green to tan lesions on leaves.",
            "The fungus Exserohilum turcicum, surviving in corn residue and favoured by moderate temperatures and heavy dew.",
            &["Apply a foliar fungicide at early lesion appearance on upper leaves"],
            &["Rotate away from corn and manage residue", "Plant resistant hybrids"],
        ));
        m.insert("tomato yellow leaf curl virus".to_string(), entry(
            "Upward curling, yellowing leaf margins, stunted growth and heavy flower drop.",
            "A begomovirus transmitted by the silverleaf whitefly (Bemisia tabaci).",
            &["Remove and destroy infected plants", "Control whiteflies with yellow sticky traps or approved insecticides"],
            &["Use insect-proof netting on seedlings", "Plant tolerant varieties", "Keep fields free of weed hosts"],
        ));
        m.insert("tomato mosaic virus".to_string(), entry(
            "Mottled light and dark green leaves, leaf distortion and uneven fruit ripening.",
            "A tobamovirus spread mechanically on hands, tools and seed; very stable outside the plant.",
            &["Remove infected plants", "Disinfect tools and wash hands after handling plants"],
            &["Use certified virus-free seed", "Avoid tobacco use around plants", "Grow resistant varieties"],
        ));
        m.insert("target spot".to_string(), entry(
            "Brown lesions with concentric rings and light centres on leaves, stems and fruit.",
            "The fungus Corynespora cassiicola, favoured by warm, humid conditions.",
            &["Apply chlorothalonil or azoxystrobin fungicide", "Remove infected lower leaves"],
            &["Improve airflow by pruning", "Avoid prolonged leaf wetness", "Rotate crops"],
        ));
        m.insert("leaf scorch".to_string(), entry(
            "Irregular purple to dark brown blotches on leaves that dry out and look burnt.",
            "The fungus Diplocarpon earlianum, spreading in wet weather from infected leaves.",
            &["Remove infected leaves after harvest", "Apply a protectant fungicide during wet spring weather"],
            &["Plant resistant cultivars", "Renovate beds regularly and avoid overcrowding"],
        ));
        Arc::new(m)
    };
}

/// Lookup of disease guidance by display name, case-insensitive.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Arc<HashMap<String, DiseaseKnowledgeEntry>>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// The knowledge base compiled into the crate
    pub fn builtin() -> Self {
        Self {
            entries: Arc::clone(&BUILTIN),
        }
    }

    /// Loads a JSON object mapping disease names to entries, replacing the built-in table.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read(path)?;
        let parsed: HashMap<String, DiseaseKnowledgeEntry> = serde_json::from_slice(&raw)?;
        info!("Loaded {} knowledge base entries from {:?}", parsed.len(), path);
        Ok(Self::from_entries(parsed))
    }

    pub fn from_entries(entries: HashMap<String, DiseaseKnowledgeEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, entry)| (name.trim().to_lowercase(), entry))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn lookup(&self, disease: &str) -> Option<&DiseaseKnowledgeEntry> {
        self.entries.get(&disease.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.lookup("Late blight").is_some());
        assert!(kb.lookup("LATE BLIGHT ").is_some());
        assert!(kb.lookup("Moon rot").is_none());
    }

    #[test]
    fn test_from_file_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        fs::write(
            &path,
            r#"{"Rice Blast": {"symptoms": "s", "causes": "c", "treatment": ["t"], "prevention": ["p"]}}"#,
        )
        .unwrap();
        let kb = KnowledgeBase::from_file(&path).unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(kb.lookup("rice blast").unwrap().treatment, vec!["t".to_string()]);
        assert!(kb.lookup("Late blight").is_none());
    }
}
