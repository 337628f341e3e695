//! Finalize: contract validation and materialization of one entity

use crate::link::{append_provenance, LinkRecord};
use crate::store::{ContainerStore, NodeId, Value};
use crate::{Error, Result};

use super::{Entity, FieldState, FieldValue};

/// Everything one entity writes, computed before the store is touched so a
/// contract violation leaves the container unchanged.
#[derive(Debug, Clone)]
pub(crate) struct FinalizePlan {
    path: String,
    datasets: Vec<(String, FieldValue, bool)>,
    links: Vec<LinkRecord>,
    attributes: Vec<(&'static str, Value)>,
    missing: Vec<String>,
    provenance: Vec<(&'static str, String)>,
}

impl FinalizePlan {
    /// Container path of the entity group.
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Pending link requests.
    pub(crate) fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    /// Optional fields recorded in `missing_fields`.
    pub(crate) fn missing(&self) -> &[String] {
        &self.missing
    }

    /// Write the plan. `link_target` maps a local link to the target
    /// dataset's path.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects a write or a local link target has
    /// not been materialized yet.
    pub(crate) fn write<S, F>(&self, store: &mut S, link_target: F) -> Result<NodeId>
    where
        S: ContainerStore,
        F: Fn(&LinkRecord) -> Option<String>,
    {
        let node = store.create_node(&self.path)?;
        for (field, value, custom) in &self.datasets {
            let id = store.write_dataset(node, field, value.value().clone())?;
            for (key, attr) in value.attributes() {
                store.set_attribute(id, key, attr.clone())?;
            }
            if *custom {
                store.set_attribute(id, "neurodata_type", Value::from("Custom"))?;
            }
        }
        for record in &self.links {
            record.materialize(store, &self.path, link_target(record).as_deref())?;
            tracing::debug!("linked {}/{}: {}", self.path, record.source_field(), record.provenance());
        }
        for (key, value) in &self.attributes {
            store.set_attribute(node, key, value.clone())?;
        }
        if !self.missing.is_empty() {
            store.set_attribute(node, "missing_fields", Value::TextList(self.missing.clone()))?;
        }
        for (key, entry) in &self.provenance {
            append_provenance(store, node, key, entry)?;
        }
        tracing::debug!(
            "finalized {} ({} datasets, {} links, {} missing)",
            self.path,
            self.datasets.len(),
            self.links.len(),
            self.missing.len()
        );
        Ok(node)
    }
}

fn count(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

impl Entity {
    /// Validate the field contract and compute what finalize writes.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntityFinalized` on a second finalize and
    /// `Error::MissingRequiredField` for the first required field with
    /// neither a value nor a link.
    pub(crate) fn finalize_plan(&self) -> Result<FinalizePlan> {
        self.ensure_mutable()?;
        let annotated = !self.annotations.is_empty();
        for field in self.ty.required() {
            let present = self.fields.get(field).is_some_and(FieldState::is_present)
                || (annotated && (field == "data" || field == "timestamps"));
            if !present {
                return Err(Error::MissingRequiredField {
                    entity: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }

        let mut datasets = Vec::new();
        let mut links = Vec::new();
        for (field, state) in &self.fields {
            match state {
                FieldState::Value(value) => {
                    let custom = self.ty.rule(field).is_none();
                    datasets.push((field.clone(), value.clone(), custom));
                }
                FieldState::Link(record) => links.push(record.clone()),
                FieldState::Ignored => {}
            }
        }

        if annotated {
            let mut sorted = self.annotations.clone();
            sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
            let (texts, times): (Vec<String>, Vec<f64>) =
                sorted.into_iter().map(|a| (a.text, a.time)).unzip();
            datasets.push((
                "data".to_string(),
                FieldValue::new(Value::TextList(texts)),
                false,
            ));
            datasets.push((
                "timestamps".to_string(),
                FieldValue::new(Value::FloatList(times)),
                false,
            ));
        }

        let has_samples = self.fields.get("num_samples").is_some_and(FieldState::is_present);
        let mut auto_samples = false;
        if !has_samples && self.ty.rule("num_samples").is_some() {
            let samples = datasets
                .iter()
                .find(|(field, _, _)| field == "data")
                .map(|(_, value, _)| value.value().len());
            if let Some(len) = samples {
                datasets.push(("num_samples".to_string(), FieldValue::new(count(len)), false));
                auto_samples = true;
            }
        }

        let written = |field: &str| {
            self.fields.get(field).is_some_and(FieldState::is_present)
                || (annotated && (field == "data" || field == "timestamps"))
        };
        let mut missing = Vec::new();
        for field in self.ty.optional() {
            if written(field) || (field == "num_samples" && auto_samples) {
                continue;
            }
            if !self.ty.alternative(field).is_some_and(written) {
                missing.push(field.to_string());
            }
        }

        let attributes = vec![
            ("neurodata_type", Value::from(self.ty.family())),
            ("ancestry", Value::TextList(self.ty.ancestry())),
        ];
        let provenance = self
            .provenance
            .iter()
            .flat_map(|(key, entries)| entries.iter().map(|e| (*key, e.clone())))
            .collect();

        Ok(FinalizePlan {
            path: self.path(),
            datasets,
            links,
            attributes,
            missing,
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, Placement};
    use crate::link::LinkTarget;
    use crate::schema::TypeRegistry;
    use crate::store::MemoryStore;

    fn entity(ty: &str, name: &str) -> Entity {
        let registry = TypeRegistry::standard();
        Entity::new(name, registry.resolve(ty).unwrap(), Placement::Acquisition)
    }

    #[test]
    fn test_missing_required() {
        let mut e = entity("AnnotationSeries", "annot");
        e.set_field("data", vec!["a"]).unwrap();
        assert!(matches!(
            e.finalize_plan(),
            Err(Error::MissingRequiredField { field, .. }) if field == "timestamps"
        ));
    }

    #[test]
    fn test_link_satisfies_required() {
        let mut e = entity("AnnotationSeries", "b");
        e.set_link(
            LinkRecord::new("b", "data", "a", "data", LinkTarget::Local(EntityId(0))).unwrap(),
        )
        .unwrap();
        e.set_field("timestamps", vec![1.0]).unwrap();
        let plan = e.finalize_plan().unwrap();
        assert_eq!(plan.links().len(), 1);
    }

    #[test]
    fn test_missing_fields_and_alternatives() {
        let mut e = entity("TimeSeries", "ts");
        e.set_field("data", vec![1.0, 2.0]).unwrap();
        e.set_field("timestamps", vec![0.0, 1.0]).unwrap();
        e.ignore_field("comment").unwrap();
        let plan = e.finalize_plan().unwrap();
        let missing = plan.missing();
        assert!(missing.contains(&"comment".to_string()));
        assert!(missing.contains(&"description".to_string()));
        assert!(!missing.contains(&"starting_time".to_string()));
        assert!(!missing.contains(&"num_samples".to_string()));
        assert!(!missing.contains(&"data".to_string()));
    }

    #[test]
    fn test_write_annotations_sorted() {
        let mut e = entity("AnnotationSeries", "annot");
        e.add_annotation("late", 2.0).unwrap();
        e.add_annotation("early", 0.5).unwrap();
        let mut store = MemoryStore::new();
        e.finalize_plan().unwrap().write(&mut store, |_| None).unwrap();

        let data = store.read_path("acquisition/timeseries/annot/data").unwrap();
        assert_eq!(
            data.into_value().unwrap(),
            Value::from(vec!["early", "late"])
        );
        let samples = store.read_path("acquisition/timeseries/annot/num_samples").unwrap();
        assert_eq!(samples.into_value().unwrap(), Value::Int(2));
        assert_eq!(
            store.attribute_at("acquisition/timeseries/annot", "ancestry").unwrap(),
            Value::from(vec!["TimeSeries", "AnnotationSeries"])
        );
        assert_eq!(
            store.attribute_at("acquisition/timeseries/annot", "neurodata_type").unwrap(),
            Value::from("TimeSeries")
        );
    }

    #[test]
    fn test_custom_field_tagged() {
        let mut e = entity("TimeSeries", "ts");
        e.set_field("my_extra", "hello").unwrap();
        let mut store = MemoryStore::new();
        e.finalize_plan().unwrap().write(&mut store, |_| None).unwrap();
        assert_eq!(
            store
                .attribute_at("acquisition/timeseries/ts/my_extra", "neurodata_type")
                .unwrap(),
            Value::from("Custom")
        );
    }

    #[test]
    fn test_dataset_attributes_written() {
        let mut e = entity("TimeSeries", "ts");
        e.set_field(
            "data",
            FieldValue::new(vec![1.0]).with_attribute("unit", "volt"),
        )
        .unwrap();
        let mut store = MemoryStore::new();
        e.finalize_plan().unwrap().write(&mut store, |_| None).unwrap();
        assert_eq!(
            store.attribute_at("acquisition/timeseries/ts/data", "unit").unwrap(),
            Value::from("volt")
        );
    }
}
