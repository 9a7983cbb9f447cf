use std::sync::Mutex;

use capture_ocr_types::DetectedTextRegion;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextChange {
    pub changed: bool,
    /// Edit distance relative to the longer text, in `[0, 1]`.
    pub ratio: f32,
}

/// Joins region texts in order with single spaces, collapsing inner whitespace.
pub fn normalized_text(regions: &[DetectedTextRegion]) -> String {
    regions
        .iter()
        .flat_map(|region| region.text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levenshtein distance between `previous` and `current` over the longer length.
pub fn change_ratio(previous: &str, current: &str) -> f32 {
    let a: Vec<char> = previous.chars().collect();
    let b: Vec<char> = current.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    levenshtein(&a, &b) as f32 / longest as f32
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// Remembers the text of the last completed run.
pub struct TextChangeTracker {
    threshold: f32,
    baseline: Mutex<Option<String>>,
}

impl TextChangeTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            baseline: Mutex::new(None),
        }
    }

    pub fn evaluate(&self, current: &str) -> TextChange {
        let baseline = self
            .baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match baseline.as_deref() {
            Some(previous) => {
                let ratio = change_ratio(previous, current);
                TextChange {
                    changed: ratio >= self.threshold,
                    ratio,
                }
            }
            None => TextChange {
                changed: true,
                ratio: 1.0,
            },
        }
    }

    pub fn commit(&self, text: String) {
        let mut baseline = self
            .baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *baseline = Some(text);
    }

    pub fn baseline(&self) -> Option<String> {
        self.baseline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
