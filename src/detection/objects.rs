use std::collections::BTreeSet;

use crate::perception::RawObjectObservation;

/// An object class worth raising an event for.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedObject {
    /// Lower-cased class label
    pub label: String,
    pub confidence: f64,
}

/// Every observation whose lower-cased class is flagged and whose confidence is strictly
/// above `floor`. Each one is reported on its own, duplicates included.
pub fn evaluate_objects(
    observation: &RawObjectObservation,
    flagged: &BTreeSet<String>,
    floor: f64,
) -> Vec<FlaggedObject> {
    observation
        .objects
        .iter()
        .filter_map(|object| {
            let label = object.class.to_lowercase();
            let confidence = object.confidence();
            (flagged.contains(&label) && confidence > floor)
                .then_some(FlaggedObject { label, confidence })
        })
        .collect()
}
