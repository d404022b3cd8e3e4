// validator.rs — Pre-commit validation of the would-be model.
//
// The commit protocol projects the model through the changeset and hands
// both to a `Validator`. Any error blocks the commit, even when forced.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use strata_changeset::{ChangeType, Changeset};
use strata_model::Model;

use crate::projection::ProjectedModel;

/// Outcome of validating a changeset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks a changeset against the model it would be committed to.
pub trait Validator: Send {
    fn validate(&self, model: &dyn Model, changeset: &Changeset, projected: &ProjectedModel) -> ValidationReport;
}

/// Structural checks that need no schema knowledge.
///
/// Problems in elements the changeset touches are errors. The same problems
/// elsewhere in the model already existed before the changeset and are
/// reported as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl Validator for StructuralValidator {
    fn validate(&self, model: &dyn Model, changeset: &Changeset, projected: &ProjectedModel) -> ValidationReport {
        let mut report = ValidationReport::default();
        let base_layers: BTreeSet<String> = model.layer_names().into_iter().collect();

        // Walk the changes in order, tracking which ids exist per layer.
        let mut present: HashMap<String, BTreeSet<String>> = base_layers
            .iter()
            .map(|name| {
                let ids = model
                    .layer(name)
                    .map(|l| l.elements.iter().map(|e| e.id.clone()).collect())
                    .unwrap_or_default();
                (name.clone(), ids)
            })
            .collect();

        for change in changeset.ordered_changes() {
            let seq = change.sequence_number;
            let id = &change.element_id;
            let layer = &change.layer_name;

            let Some(ids) = present.get_mut(layer) else {
                report.errors.push(format!(
                    "change #{} ({} '{}') targets unknown layer '{}'",
                    seq, change.change_type, id, layer
                ));
                continue;
            };

            match change.change_type {
                ChangeType::Add => {
                    if id.is_empty() {
                        report
                            .errors
                            .push(format!("change #{} (add) has an empty element id", seq));
                    }
                    match &change.after {
                        None => report.errors.push(format!(
                            "change #{} (add '{}') carries no element fields",
                            seq, id
                        )),
                        Some(after) => {
                            if let Some(declared) = after.get("id").and_then(|v| v.as_str()) {
                                if declared != id {
                                    report.errors.push(format!(
                                        "change #{} (add '{}') declares a different id '{}'",
                                        seq, id, declared
                                    ));
                                }
                            }
                        }
                    }
                    if !ids.insert(id.clone()) {
                        report.warnings.push(format!(
                            "change #{} adds '{}' which already exists in '{}'; it will be skipped",
                            seq, id, layer
                        ));
                    }
                }
                ChangeType::Update => {
                    if !ids.contains(id) {
                        report.errors.push(format!(
                            "change #{} updates '{}' which does not exist in layer '{}'",
                            seq, id, layer
                        ));
                    }
                    if change.after.is_none() {
                        report.errors.push(format!(
                            "change #{} (update '{}') carries no element fields",
                            seq, id
                        ));
                    }
                }
                ChangeType::Delete => {
                    if !ids.remove(id) {
                        report.errors.push(format!(
                            "change #{} deletes '{}' which does not exist in layer '{}'",
                            seq, id, layer
                        ));
                    }
                }
            }
        }

        let touched: BTreeSet<&str> = changeset
            .changes
            .iter()
            .map(|c| c.element_id.as_str())
            .collect();

        let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
        for layer in projected.layers() {
            for element in &layer.elements {
                owners.entry(element.id.as_str()).or_default().push(layer.name.as_str());
            }
        }

        let mut duplicates: Vec<(&str, &Vec<&str>)> = owners
            .iter()
            .filter(|(_, layers)| layers.len() > 1)
            .map(|(id, layers)| (*id, layers))
            .collect();
        duplicates.sort();
        for (id, layers) in duplicates {
            let message = format!("element id '{}' appears {} times (layers: {})", id, layers.len(), layers.join(", "));
            if touched.contains(id) {
                report.errors.push(message);
            } else {
                report.warnings.push(message);
            }
        }

        for layer in projected.layers() {
            for element in &layer.elements {
                for rel in &element.relationships {
                    if owners.contains_key(rel.target.as_str()) {
                        continue;
                    }
                    let message = format!(
                        "element '{}' in '{}' has a relationship to unknown element '{}'",
                        element.id, layer.name, rel.target
                    );
                    if touched.contains(element.id.as_str()) || touched.contains(rel.target.as_str()) {
                        report.errors.push(message);
                    } else {
                        report.warnings.push(message);
                    }
                }
            }
        }

        report
    }
}
